use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Reference to an uploaded object, returned by [`BlobStore::upload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub path: String,
}

/// Path-addressed object storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload data to storage
    async fn upload(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<BlobHandle>;

    /// Long-lived, publicly fetchable URL for an uploaded object
    async fn durable_url(&self, handle: &BlobHandle) -> Result<String>;

    /// Download data from storage
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Delete data from storage. Deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if an object exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}

/// Percent-encode each segment of a storage path for use in a URL
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a public base URL and a storage path
pub fn public_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), encode_path(path))
}
