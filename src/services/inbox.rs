use serde_json::Value;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{InboxItem, InboxKind, RecordPath};
use crate::records::RecordStore;

/// Read and prune enquiries, subscribers and bookings
pub struct InboxService {
    records: Arc<dyn RecordStore>,
}

impl InboxService {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    /// Items newest first. Items without a readable timestamp sort last.
    pub async fn list(&self, kind: InboxKind) -> Result<Vec<InboxItem>> {
        let value = self
            .records
            .read(&RecordPath::collection(kind.collection()))
            .await?;

        let mut items: Vec<InboxItem> = match value {
            None => Vec::new(),
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(id, value)| match value {
                    Value::Object(value) => Some(InboxItem { id, value }),
                    _ => {
                        tracing::warn!("Skipping malformed {} item: {}", kind.as_str(), id);
                        None
                    }
                })
                .collect(),
            Some(_) => {
                return Err(AppError::Internal(format!(
                    "{} collection is not an object",
                    kind.collection()
                )))
            }
        };

        // Stable sort keeps store order among equal timestamps
        items.sort_by_key(|item| std::cmp::Reverse(item.timestamp_millis()));
        Ok(items)
    }

    pub async fn delete(&self, kind: InboxKind, id: &str) -> Result<()> {
        let path = RecordPath::record(kind.collection(), id);
        if self.records.read(&path).await?.is_none() {
            return Err(AppError::NotFound(format!("{} item not found: {}", kind.as_str(), id)));
        }
        self.records.delete(&path).await?;
        tracing::info!("Deleted {} item {}", kind.as_str(), id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MemoryRecordStore;
    use assert_matches::assert_matches;
    use serde_json::json;

    async fn seeded() -> InboxService {
        let records = Arc::new(MemoryRecordStore::new());
        let entries = [
            ("old", json!({ "name": "A", "timestamp": 1_000 })),
            ("undated", json!({ "name": "B" })),
            ("new", json!({ "name": "C", "timestamp": "2024-01-01T00:00:00Z" })),
        ];
        for (id, value) in entries {
            records
                .write(&RecordPath::record("bookings", id), value)
                .await
                .unwrap();
        }
        InboxService::new(records)
    }

    #[tokio::test]
    async fn list_is_newest_first_with_undated_last() {
        let inbox = seeded().await;
        let ids: Vec<_> = inbox
            .list(InboxKind::Bookings)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec!["new", "old", "undated"]);
    }

    #[tokio::test]
    async fn delete_removes_one_item() {
        let inbox = seeded().await;
        inbox.delete(InboxKind::Bookings, "old").await.unwrap();

        assert_eq!(inbox.list(InboxKind::Bookings).await.unwrap().len(), 2);
        assert_matches!(
            inbox.delete(InboxKind::Bookings, "old").await,
            Err(AppError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn empty_inbox_lists_nothing() {
        let inbox = seeded().await;
        assert!(inbox.list(InboxKind::Subscribers).await.unwrap().is_empty());
    }
}
