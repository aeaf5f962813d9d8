use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use crate::errors::GraphDbError;

use super::StorageAdapter;

pub const FILE_EXTENSION: &str = "gdb";

/// Single-file backend. Saves go to a sibling temp file that is synced and then
/// renamed over the live file, so a crash never leaves a half-written snapshot.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    tmp_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens the file for `name` under `dir`, creating the directory and an empty
    /// file if missing.
    pub fn open<P: AsRef<Path>>(dir: P, name: &str) -> Result<Self, GraphDbError> {
        if name.trim().is_empty() || name.contains(['/', '\\']) {
            return Err(GraphDbError::invalid_input(format!(
                "invalid database name {name:?}"
            )));
        }
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            GraphDbError::storage(format!("cannot create {}: {e}", dir.display()))
        })?;
        let path = dir.join(format!("{name}.{FILE_EXTENSION}"));
        let tmp_path = dir.join(format!("{name}.{FILE_EXTENSION}.tmp"));
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| GraphDbError::storage(format!("cannot open {}: {e}", path.display())))?;
        Ok(Self {
            path,
            tmp_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageAdapter for FileStorage {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn read(&self) -> Result<Option<Vec<u8>>, GraphDbError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GraphDbError::storage(e.to_string())),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| GraphDbError::storage(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    fn write(&self, bytes: &[u8]) -> Result<(), GraphDbError> {
        let _guard = self.write_lock.lock();
        let mut tmp = File::create(&self.tmp_path)
            .map_err(|e| GraphDbError::storage(format!("{}: {e}", self.tmp_path.display())))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.sync_all())
            .map_err(|e| GraphDbError::storage(e.to_string()))?;
        drop(tmp);
        fs::rename(&self.tmp_path, &self.path)
            .map_err(|e| GraphDbError::storage(format!("{}: {e}", self.path.display())))
    }
}
