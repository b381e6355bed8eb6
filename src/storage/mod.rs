pub mod local;
pub mod memory;
pub mod provider;

pub use local::*;
pub use memory::*;
pub use provider::*;

use std::sync::Arc;

use crate::config::{BlobBackend, StorageConfig};

/// Build the blob store selected by configuration
pub fn open_blob_store(config: &StorageConfig) -> Arc<dyn BlobStore> {
    let store: Arc<dyn BlobStore> = match config.backend {
        BlobBackend::Local => Arc::new(LocalBlobStore::new(
            &config.local_path,
            config.public_base_url.clone(),
        )),
        BlobBackend::Memory => Arc::new(MemoryBlobStore::new(config.public_base_url.clone())),
    };
    tracing::info!("Blob store ready: {}", store.storage_type());
    store
}
