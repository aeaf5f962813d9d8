use std::sync::Arc;

use ahash::AHashMap;
use base64::{Engine, engine::general_purpose::STANDARD};
use parking_lot::RwLock;

use crate::errors::GraphDbError;

use super::StorageAdapter;

pub const BLOB_KEY_PREFIX: &str = "genosdb/";

/// String key/value store used when no durable file is available.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, GraphDbError>;
    fn set(&self, key: &str, value: &str) -> Result<(), GraphDbError>;
}

/// Process-local blob store. Clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<AHashMap<String, String>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, GraphDbError> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), GraphDbError> {
        self.inner.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Stores the snapshot as one base64 string under `genosdb/<name>`.
pub struct BlobStorage {
    store: Arc<dyn BlobStore>,
    key: String,
}

impl BlobStorage {
    pub fn new(store: Arc<dyn BlobStore>, name: &str) -> Self {
        Self {
            store,
            key: format!("{BLOB_KEY_PREFIX}{name}"),
        }
    }
}

impl StorageAdapter for BlobStorage {
    fn kind(&self) -> &'static str {
        "blob"
    }

    fn read(&self) -> Result<Option<Vec<u8>>, GraphDbError> {
        match self.store.get(&self.key)? {
            Some(encoded) if !encoded.is_empty() => STANDARD
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(|e| GraphDbError::codec(format!("base64 decode failed: {e}"))),
            _ => Ok(None),
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<(), GraphDbError> {
        self.store.set(&self.key, &STANDARD.encode(bytes))
    }
}
