use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{AppError, Result};
use crate::storage::{public_url, BlobHandle, BlobStore};

/// In-process blob store for development runs and tests
pub struct MemoryBlobStore {
    public_base_url: String,
    objects: Mutex<HashMap<String, Bytes>>,
    uploads: AtomicUsize,
    deletes: AtomicUsize,
    failing_uploads: Mutex<Vec<String>>,
    failing_deletes: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            objects: Mutex::new(HashMap::new()),
            uploads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            failing_uploads: Mutex::new(Vec::new()),
            failing_deletes: Mutex::new(Vec::new()),
        }
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bytes>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn should_fail(list: &Mutex<Vec<String>>, path: &str) -> bool {
        list.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|fragment| path.contains(fragment.as_str()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, data: Bytes, _content_type: Option<&str>) -> Result<BlobHandle> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if Self::should_fail(&self.failing_uploads, path) {
            return Err(AppError::Storage(format!("Upload rejected: {}", path)));
        }
        self.objects().insert(path.to_string(), data);
        Ok(BlobHandle {
            path: path.to_string(),
        })
    }

    async fn durable_url(&self, handle: &BlobHandle) -> Result<String> {
        if !self.objects().contains_key(&handle.path) {
            return Err(AppError::NotFound(format!("Blob not found: {}", handle.path)));
        }
        Ok(public_url(&self.public_base_url, &handle.path))
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        self.objects()
            .get(path)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Blob not found: {}", path)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if Self::should_fail(&self.failing_deletes, path) {
            return Err(AppError::Storage(format!("Delete rejected: {}", path)));
        }
        self.objects().remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects().contains_key(path))
    }

    fn storage_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
impl MemoryBlobStore {
    /// Make every upload whose path contains `fragment` fail
    pub fn fail_uploads_matching(&self, fragment: &str) {
        self.failing_uploads.lock().unwrap().push(fragment.to_string());
    }

    /// Make every delete whose path contains `fragment` fail
    pub fn fail_deletes_matching(&self, fragment: &str) {
        self.failing_deletes.lock().unwrap().push(fragment.to_string());
    }

    pub fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.objects().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Put an object in place without counting it as an upload
    pub fn seed(&self, path: &str) -> crate::models::StoredImage {
        self.objects().insert(path.to_string(), Bytes::from_static(b"seed"));
        crate::models::StoredImage {
            url: public_url(&self.public_base_url, path),
            storage_path: path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn injected_failures_only_hit_matching_paths() {
        let store = MemoryBlobStore::new("mem://blobs");
        store.fail_uploads_matching("broken");

        assert!(store.upload("a/ok.jpg", Bytes::from_static(b"1"), None).await.is_ok());
        assert_matches!(
            store.upload("a/broken.jpg", Bytes::from_static(b"2"), None).await,
            Err(AppError::Storage(_))
        );
        assert_eq!(store.upload_calls(), 2);
        assert_eq!(store.paths(), vec!["a/ok.jpg".to_string()]);
    }

    #[tokio::test]
    async fn durable_url_requires_an_uploaded_object() {
        let store = MemoryBlobStore::new("mem://blobs");
        let handle = BlobHandle {
            path: "missing.jpg".to_string(),
        };
        assert_matches!(store.durable_url(&handle).await, Err(AppError::NotFound(_)));
    }
}
