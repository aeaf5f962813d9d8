//! Durable storage backends for snapshot bytes.
//!
//! A backend stores exactly one opaque blob per database. The backend is chosen once
//! when the database opens, see [`open_storage`].

mod blob;
mod file;
#[cfg(feature = "sqlite-backend")]
mod sqlite_blob;

pub use blob::{BlobStorage, BlobStore, MemoryBlobStore};
pub use file::FileStorage;
#[cfg(feature = "sqlite-backend")]
pub use sqlite_blob::SqliteBlobStore;

use tracing::{info, warn};

use crate::{config::StorageKind, errors::GraphDbError};

pub trait StorageAdapter: Send + Sync {
    /// Short backend label for stats and logs.
    fn kind(&self) -> &'static str;
    /// Returns the stored blob, or `None` when nothing has been saved yet.
    fn read(&self) -> Result<Option<Vec<u8>>, GraphDbError>;
    /// Replaces the stored blob.
    fn write(&self, bytes: &[u8]) -> Result<(), GraphDbError>;
}

/// Backend for databases that are never persisted.
#[derive(Debug, Default)]
pub struct NullStorage;

impl StorageAdapter for NullStorage {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn read(&self) -> Result<Option<Vec<u8>>, GraphDbError> {
        Ok(None)
    }

    fn write(&self, _bytes: &[u8]) -> Result<(), GraphDbError> {
        Ok(())
    }
}

/// Resolves a [`StorageKind`] into a live backend.
///
/// `StorageKind::Auto` probes the durable-file backend and falls back to the blob
/// store when the directory cannot be opened; the choice is not revisited later.
pub fn open_storage(
    name: &str,
    kind: &StorageKind,
) -> Result<Box<dyn StorageAdapter>, GraphDbError> {
    match kind {
        StorageKind::Memory => Ok(Box::new(NullStorage)),
        StorageKind::File { dir } => Ok(Box::new(FileStorage::open(dir, name)?)),
        StorageKind::Blob(store) => Ok(Box::new(BlobStorage::new(store.clone(), name))),
        StorageKind::Auto { dir, fallback } => match FileStorage::open(dir, name) {
            Ok(file) => {
                info!(path = %file.path().display(), "using durable file storage");
                Ok(Box::new(file))
            }
            Err(err) => {
                warn!(error = %err, "durable file storage unavailable, falling back to blob store");
                Ok(Box::new(BlobStorage::new(fallback.clone(), name)))
            }
        },
    }
}
