use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{public_url, BlobHandle, BlobStore};

/// Local file system blob store
pub struct LocalBlobStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into(),
        }
    }

    fn get_full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(AppError::BadRequest(format!("Invalid storage path: {}", path)));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, path: &str, data: Bytes, _content_type: Option<&str>) -> Result<BlobHandle> {
        let full_path = self.get_full_path(path)?;

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        tracing::debug!("Saved blob to {:?}", full_path);
        Ok(BlobHandle {
            path: path.to_string(),
        })
    }

    async fn durable_url(&self, handle: &BlobHandle) -> Result<String> {
        Ok(public_url(&self.public_base_url, &handle.path))
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let full_path = self.get_full_path(path)?;

        let data = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("Blob not found: {}", path))
            } else {
                AppError::Storage(format!("Failed to read blob: {}", e))
            }
        })?;

        Ok(Bytes::from(data))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.get_full_path(path)?;

        if fs::try_exists(&full_path).await? {
            fs::remove_file(&full_path).await?;
            tracing::debug!("Deleted blob {:?}", full_path);

            // Try to remove empty parent directories
            let mut current_dir = full_path.parent().map(|p| p.to_path_buf());
            while let Some(dir) = current_dir {
                if dir == self.base_path {
                    break;
                }
                match fs::read_dir(&dir).await {
                    Ok(mut entries) => {
                        if entries.next_entry().await?.is_some() {
                            break; // Not empty
                        }
                        let _ = fs::remove_dir(&dir).await;
                    }
                    Err(_) => break,
                }
                current_dir = dir.parent().map(|p| p.to_path_buf());
            }
        }

        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.get_full_path(path)?;
        Ok(fs::try_exists(&full_path).await?)
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}
