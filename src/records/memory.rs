use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::models::RecordPath;
use crate::records::subscription::{self, ChangeCallback, Subscription, SubscriptionHub};
use crate::records::{merge_into, RecordStore};

type Collection = Vec<(String, Value)>;

/// In-process record store; collections keep insertion order
#[derive(Default)]
pub struct MemoryRecordStore {
    collections: Mutex<HashMap<String, Collection>>,
    hub: SubscriptionHub,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> std::sync::MutexGuard<'_, HashMap<String, Collection>> {
        self.collections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn upsert(&self, collection: &str, id: &str, value: Value) {
        let mut collections = self.collections();
        let records = collections.entry(collection.to_string()).or_default();
        match records.iter_mut().find(|(key, _)| key == id) {
            Some((_, existing)) => *existing = value,
            None => records.push((id.to_string(), value)),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, collection: &str) -> Result<String> {
        RecordPath::collection(collection).validate()?;
        Ok(Uuid::new_v4().to_string())
    }

    async fn write(&self, path: &RecordPath, value: Value) -> Result<()> {
        path.validate()?;
        let id = path.record_id()?;
        self.upsert(path.collection_name(), id, value);
        subscription::publish(self, &self.hub, path).await;
        Ok(())
    }

    async fn merge(&self, path: &RecordPath, partial: Map<String, Value>) -> Result<()> {
        path.validate()?;
        let id = path.record_id()?;
        {
            let mut collections = self.collections();
            let records = collections.entry(path.collection_name().to_string()).or_default();
            match records.iter_mut().find(|(key, _)| key == id) {
                Some((_, existing)) => *existing = merge_into(Some(existing.take()), partial),
                None => records.push((id.to_string(), merge_into(None, partial))),
            }
        }
        subscription::publish(self, &self.hub, path).await;
        Ok(())
    }

    async fn read(&self, path: &RecordPath) -> Result<Option<Value>> {
        path.validate()?;
        let collections = self.collections();
        let Some(records) = collections.get(path.collection_name()) else {
            return Ok(None);
        };

        match path.id() {
            Some(id) => Ok(records
                .iter()
                .find(|(key, _)| key == id)
                .map(|(_, value)| value.clone())),
            None if records.is_empty() => Ok(None),
            None => {
                let map: Map<String, Value> = records.iter().cloned().collect();
                Ok(Some(Value::Object(map)))
            }
        }
    }

    async fn delete(&self, path: &RecordPath) -> Result<()> {
        path.validate()?;
        {
            let mut collections = self.collections();
            match path.id() {
                Some(id) => {
                    if let Some(records) = collections.get_mut(path.collection_name()) {
                        records.retain(|(key, _)| key != id);
                    }
                }
                None => {
                    collections.remove(path.collection_name());
                }
            }
        }
        subscription::publish(self, &self.hub, path).await;
        Ok(())
    }

    async fn subscribe(&self, path: &RecordPath, on_change: ChangeCallback) -> Result<Subscription> {
        subscription::subscribe(self, &self.hub, path, on_change).await
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn recorder() -> (ChangeCallback, Arc<Mutex<Vec<Option<Value>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ChangeCallback =
            Arc::new(move |value: Option<Value>| sink.lock().unwrap().push(value));
        (callback, seen)
    }

    #[tokio::test]
    async fn collection_read_keeps_creation_order() {
        let store = MemoryRecordStore::new();
        for name in ["b", "a", "c"] {
            store
                .write(&RecordPath::record("cars", name), json!({ "title": name }))
                .await
                .unwrap();
        }

        let all = store.read(&RecordPath::collection("cars")).await.unwrap().unwrap();
        let ids: Vec<_> = all.as_object().unwrap().keys().cloned().collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn merge_creates_missing_record_and_keeps_other_keys() {
        let store = MemoryRecordStore::new();
        let path = RecordPath::record("yachts", "y1");

        let mut partial = Map::new();
        partial.insert("name".to_string(), json!("Aurora"));
        store.merge(&path, partial).await.unwrap();

        let mut partial = Map::new();
        partial.insert("price".to_string(), json!("90k"));
        store.merge(&path, partial).await.unwrap();

        let value = store.read(&path).await.unwrap().unwrap();
        assert_eq!(value, json!({ "name": "Aurora", "price": "90k" }));
    }

    #[tokio::test]
    async fn subscribe_fires_immediately_then_on_every_change() {
        let store = MemoryRecordStore::new();
        let (callback, seen) = recorder();

        let subscription = store
            .subscribe(&RecordPath::collection("testimonials"), callback)
            .await
            .unwrap();
        store
            .write(&RecordPath::record("testimonials", "t1"), json!({ "name": "Ana" }))
            .await
            .unwrap();
        store.delete(&RecordPath::record("testimonials", "t1")).await.unwrap();

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 3);
            assert_eq!(seen[0], None);
            assert_eq!(seen[1], Some(json!({ "t1": { "name": "Ana" } })));
            assert_eq!(seen[2], None);
        }

        subscription.unsubscribe();
        store
            .write(&RecordPath::record("testimonials", "t2"), json!({ "name": "Bo" }))
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn record_subscription_ignores_siblings() {
        let store = MemoryRecordStore::new();
        let (callback, seen) = recorder();

        let _subscription = store
            .subscribe(&RecordPath::record("cars", "c1"), callback)
            .await
            .unwrap();
        store
            .write(&RecordPath::record("cars", "c2"), json!({ "title": "Other" }))
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn write_to_collection_path_is_rejected() {
        let store = MemoryRecordStore::new();
        assert!(store.write(&RecordPath::collection("cars"), json!({})).await.is_err());
    }
}
