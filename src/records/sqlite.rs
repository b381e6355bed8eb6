use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;
use crate::models::RecordPath;
use crate::records::subscription::{self, ChangeCallback, Subscription, SubscriptionHub};
use crate::records::{merge_into, RecordStore};

const UPSERT: &str = r#"
    INSERT INTO records (collection, id, value, seq, created_at, updated_at)
    VALUES (?, ?, ?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM records), ?, ?)
    ON CONFLICT(collection, id) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#;

/// Record store backed by the `records` table
pub struct SqliteRecordStore {
    db: Database,
    hub: SubscriptionHub,
}

impl SqliteRecordStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            hub: SubscriptionHub::new(),
        }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, collection: &str) -> Result<String> {
        RecordPath::collection(collection).validate()?;
        Ok(Uuid::new_v4().to_string())
    }

    async fn write(&self, path: &RecordPath, value: Value) -> Result<()> {
        path.validate()?;
        let id = path.record_id()?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(UPSERT)
            .bind(path.collection_name())
            .bind(id)
            .bind(serde_json::to_string(&value)?)
            .bind(&now)
            .bind(&now)
            .execute(self.db.pool())
            .await?;

        subscription::publish(self, &self.hub, path).await;
        Ok(())
    }

    async fn merge(&self, path: &RecordPath, partial: Map<String, Value>) -> Result<()> {
        path.validate()?;
        let id = path.record_id()?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.db.pool().begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT value FROM records WHERE collection = ? AND id = ?")
                .bind(path.collection_name())
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let existing = existing
            .map(|(raw,)| serde_json::from_str::<Value>(&raw))
            .transpose()?;
        let merged = merge_into(existing, partial);

        sqlx::query(UPSERT)
            .bind(path.collection_name())
            .bind(id)
            .bind(serde_json::to_string(&merged)?)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        subscription::publish(self, &self.hub, path).await;
        Ok(())
    }

    async fn read(&self, path: &RecordPath) -> Result<Option<Value>> {
        path.validate()?;

        match path.id() {
            Some(id) => {
                let row: Option<(String,)> =
                    sqlx::query_as("SELECT value FROM records WHERE collection = ? AND id = ?")
                        .bind(path.collection_name())
                        .bind(id)
                        .fetch_optional(self.db.pool())
                        .await?;
                Ok(row.map(|(raw,)| serde_json::from_str(&raw)).transpose()?)
            }
            None => {
                let rows: Vec<(String, String)> = sqlx::query_as(
                    "SELECT id, value FROM records WHERE collection = ? ORDER BY seq ASC",
                )
                .bind(path.collection_name())
                .fetch_all(self.db.pool())
                .await?;

                if rows.is_empty() {
                    return Ok(None);
                }

                let mut map = Map::new();
                for (id, raw) in rows {
                    map.insert(id, serde_json::from_str(&raw)?);
                }
                Ok(Some(Value::Object(map)))
            }
        }
    }

    async fn delete(&self, path: &RecordPath) -> Result<()> {
        path.validate()?;

        match path.id() {
            Some(id) => {
                sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
                    .bind(path.collection_name())
                    .bind(id)
                    .execute(self.db.pool())
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM records WHERE collection = ?")
                    .bind(path.collection_name())
                    .execute(self.db.pool())
                    .await?;
            }
        }

        subscription::publish(self, &self.hub, path).await;
        Ok(())
    }

    async fn subscribe(&self, path: &RecordPath, on_change: ChangeCallback) -> Result<Subscription> {
        subscription::subscribe(self, &self.hub, path, on_change).await
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    async fn open(dir: &tempfile::TempDir) -> SqliteRecordStore {
        let path = dir.path().join("records.db");
        let db = Database::new(path.to_str().unwrap()).await.unwrap();
        db.run_migrations().await.unwrap();
        SqliteRecordStore::new(db)
    }

    #[tokio::test]
    async fn write_read_and_overwrite_keep_position() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        let first = store.create("aircraft").await.unwrap();
        let second = store.create("aircraft").await.unwrap();
        assert_ne!(first, second);

        store
            .write(&RecordPath::record("aircraft", &first), json!({ "name": "Global 6000" }))
            .await
            .unwrap();
        store
            .write(&RecordPath::record("aircraft", &second), json!({ "name": "Falcon 8X" }))
            .await
            .unwrap();
        store
            .write(&RecordPath::record("aircraft", &first), json!({ "name": "Global 7500" }))
            .await
            .unwrap();

        let all = store.read(&RecordPath::collection("aircraft")).await.unwrap().unwrap();
        let all = all.as_object().unwrap();
        let ids: Vec<_> = all.keys().cloned().collect();
        assert_eq!(ids, vec![first.clone(), second]);
        assert_eq!(all[&first]["name"], "Global 7500");
    }

    #[tokio::test]
    async fn merge_is_shallow() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        let path = RecordPath::record("helicopters", "h1");

        store
            .write(&path, json!({ "title": "H145", "performance": { "range": "650km", "maxSpeed": "268" } }))
            .await
            .unwrap();

        let mut partial = Map::new();
        partial.insert("performance".to_string(), json!({ "range": "700km" }));
        store.merge(&path, partial).await.unwrap();

        let value = store.read(&path).await.unwrap().unwrap();
        assert_eq!(value["title"], "H145");
        assert_eq!(value["performance"], json!({ "range": "700km" }));
    }

    #[tokio::test]
    async fn delete_notifies_record_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        let path = RecordPath::record("cars", "c1");
        store.write(&path, json!({ "title": "Phantom" })).await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = store
            .subscribe(
                &path,
                Arc::new(move |value: Option<Value>| sink.lock().unwrap().push(value)),
            )
            .await
            .unwrap();
        store.delete(&path).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[Some(json!({ "title": "Phantom" })), None]);
        assert_eq!(store.hub.listener_count(), 1);
    }

    #[tokio::test]
    async fn empty_collection_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        assert_eq!(store.read(&RecordPath::collection("deals")).await.unwrap(), None);
    }
}
