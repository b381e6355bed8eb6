use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::Result;
use crate::models::RecordPath;
use crate::records::RecordStore;

/// Receives the current value at a subscribed path; `None` means nothing is stored there
pub type ChangeCallback = Arc<dyn Fn(Option<Value>) + Send + Sync>;

struct Listener {
    path: RecordPath,
    callback: ChangeCallback,
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, Listener>>,
}

impl HubInner {
    fn listeners(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Listener>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Registry of live listeners shared by a record store
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, path: RecordPath, callback: ChangeCallback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().insert(id, Listener { path, callback });
        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Listeners that can see a change at `changed`
    fn watchers(&self, changed: &RecordPath) -> Vec<(RecordPath, ChangeCallback)> {
        self.inner
            .listeners()
            .values()
            .filter(|listener| listener.path.observes(changed))
            .map(|listener| (listener.path.clone(), listener.callback.clone()))
            .collect()
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

/// Live subscription handle. Dropping it has the same effect as [`Subscription::unsubscribe`].
pub struct Subscription {
    id: u64,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.listeners().remove(&self.id);
        }
    }
}

/// Register a listener and deliver the current value to it right away
pub(crate) async fn subscribe<S: RecordStore + ?Sized>(
    store: &S,
    hub: &SubscriptionHub,
    path: &RecordPath,
    on_change: ChangeCallback,
) -> Result<Subscription> {
    path.validate()?;
    // Registered before the initial read so no change can slip between the two
    let subscription = hub.register(path.clone(), on_change.clone());
    let current = store.read(path).await?;
    on_change(current);
    Ok(subscription)
}

/// Push the fresh value to every listener that observes `changed`
pub(crate) async fn publish<S: RecordStore + ?Sized>(
    store: &S,
    hub: &SubscriptionHub,
    changed: &RecordPath,
) {
    for (path, callback) in hub.watchers(changed) {
        match store.read(&path).await {
            Ok(value) => callback(value),
            Err(e) => tracing::warn!("Failed to read {} for subscribers: {}", path, e),
        }
    }
}
