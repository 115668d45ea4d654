//! Object storage for snapshots.
//!
//! The store is the system of record for snapshot history; there is no local
//! database. Backends implement [`ObjectStore`] and are selected by config.

mod fs;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{AppConfig, StorageBackend};

pub use fs::FsObjectStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Byte-blob storage addressed by string keys.
///
/// All calls are potentially remote and fallible. A `get` miss is an expected
/// outcome (`Ok(None)`), never an error; deleting a key that does not exist
/// succeeds.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, content: &[u8]) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Open the object store selected by config.
pub fn open(config: &AppConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
    match config.storage_backend {
        StorageBackend::Fs => Ok(Arc::new(FsObjectStore::open(
            &config.storage_root,
            &config.storage_bucket,
        )?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
