pub mod memory;
pub mod sqlite;
pub mod subscription;

pub use memory::*;
pub use sqlite::*;
pub use subscription::{ChangeCallback, Subscription, SubscriptionHub};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::{DatabaseConfig, RecordBackend};
use crate::db::Database;
use crate::error::Result;
use crate::models::RecordPath;

/// Live-updating document store keyed by collection and record id
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Allocate a new unique id under a collection
    async fn create(&self, collection: &str) -> Result<String>;

    /// Full overwrite of a record
    async fn write(&self, path: &RecordPath, value: Value) -> Result<()>;

    /// Shallow merge of top-level keys into a record, creating it if missing
    async fn merge(&self, path: &RecordPath, partial: Map<String, Value>) -> Result<()>;

    /// A record, or a whole collection as an `{id: value}` object in creation order.
    /// `None` when nothing is stored at the path.
    async fn read(&self, path: &RecordPath) -> Result<Option<Value>>;

    /// Remove a record, or every record of a collection
    async fn delete(&self, path: &RecordPath) -> Result<()>;

    /// Fires `on_change` once with the current value, then after every change
    /// under `path` until the returned subscription is dropped
    async fn subscribe(&self, path: &RecordPath, on_change: ChangeCallback) -> Result<Subscription>;

    fn backend_name(&self) -> &'static str;
}

/// Build the record store selected by configuration
pub async fn open_record_store(config: &DatabaseConfig) -> Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.backend {
        RecordBackend::Sqlite => {
            let db = Database::new(&config.path).await?;
            db.run_migrations().await?;
            Arc::new(SqliteRecordStore::new(db))
        }
        RecordBackend::Memory => Arc::new(MemoryRecordStore::new()),
    };
    tracing::info!("Record store ready: {}", store.backend_name());
    Ok(store)
}

/// Shallow merge used by every backend
pub(crate) fn merge_into(existing: Option<Value>, partial: Map<String, Value>) -> Value {
    let mut base = match existing {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (key, value) in partial {
        base.insert(key, value);
    }
    Value::Object(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_replaces_top_level_keys_only() {
        let existing = json!({ "name": "Aurora", "specifications": { "beam": "9m", "draft": "3m" } });
        let mut partial = Map::new();
        partial.insert("specifications".to_string(), json!({ "beam": "10m" }));

        let merged = merge_into(Some(existing), partial);
        assert_eq!(merged["name"], "Aurora");
        assert_eq!(merged["specifications"], json!({ "beam": "10m" }));
    }
}
