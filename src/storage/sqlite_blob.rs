use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::GraphDbError;

use super::BlobStore;

/// [`BlobStore`] kept in one SQLite table, for hosts that already ship a SQLite file.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
}

impl SqliteBlobStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GraphDbError> {
        let conn = Connection::open(path).map_err(|e| GraphDbError::storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, GraphDbError> {
        let conn = Connection::open_in_memory().map_err(|e| GraphDbError::storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, GraphDbError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS genosdb_blobs (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| GraphDbError::storage(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, GraphDbError> {
        self.conn
            .lock()
            .query_row(
                "SELECT value FROM genosdb_blobs WHERE key=?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| GraphDbError::storage(e.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), GraphDbError> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO genosdb_blobs(key, value) VALUES(?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value",
                params![key, value],
            )
            .map_err(|e| GraphDbError::storage(e.to_string()))?;
        Ok(())
    }
}
