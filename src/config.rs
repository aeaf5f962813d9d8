//! Database configuration.
//!
//! [`GraphConfig`] holds the tunables of one database instance: its name, the oplog
//! window, traversal depth limits, the storage backend and the conflict policy used
//! when merging operations from peers.

use std::{env, fmt, path::PathBuf, sync::Arc, time::Duration};

use crate::{errors::GraphDbError, oplog::DEFAULT_OPLOG_WINDOW, storage::BlobStore};

pub const DEFAULT_NAME: &str = "genosdb";
pub const DEFAULT_MAX_DEPTH: u32 = 10;
pub const DEFAULT_MAX_DEPTH_LIMIT: u32 = 1024;
pub const DEFAULT_PERSIST_DEBOUNCE: Duration = Duration::from_millis(50);

/// Where snapshots are written.
///
/// # Examples
///
/// ```rust
/// use genosdb::{GraphConfig, StorageKind};
///
/// let cfg = GraphConfig::in_memory();
/// assert!(matches!(cfg.storage, StorageKind::Memory));
///
/// let cfg = GraphConfig::file("/tmp/genosdb-doc");
/// assert!(matches!(cfg.storage, StorageKind::File { .. }));
/// ```
#[derive(Clone, Default)]
pub enum StorageKind {
    /// Nothing is persisted.
    #[default]
    Memory,
    /// One durable file per database under `dir`.
    File { dir: PathBuf },
    /// One base64 string in a key/value store.
    Blob(Arc<dyn BlobStore>),
    /// Durable file when `dir` is usable, otherwise `fallback`. Decided once at open.
    Auto {
        dir: PathBuf,
        fallback: Arc<dyn BlobStore>,
    },
}

impl fmt::Debug for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Memory => write!(f, "Memory"),
            StorageKind::File { dir } => f.debug_struct("File").field("dir", dir).finish(),
            StorageKind::Blob(_) => write!(f, "Blob(..)"),
            StorageKind::Auto { dir, .. } => f
                .debug_struct("Auto")
                .field("dir", dir)
                .finish_non_exhaustive(),
        }
    }
}

/// Built-in merge policies for operations received from peers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep whichever side has the greater `(timestamp, version)`; ties keep local.
    #[default]
    LastWriteWins,
    /// Apply every incoming operation in arrival order.
    ArrivalOrder,
}

#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// Database name: file stem for the file backend, key suffix for the blob backend.
    pub name: String,

    /// Number of operations retained in the oplog.
    ///
    /// **Default:** `100`
    pub oplog_window: usize,

    /// Traversal depth used when neither the query nor the options set one.
    ///
    /// **Default:** `10`
    pub default_max_depth: u32,

    /// Largest accepted traversal depth.
    ///
    /// **Default:** `1024`
    pub max_depth_limit: u32,

    pub storage: StorageKind,

    /// How long the save worker waits for more mutations before writing.
    ///
    /// **Default:** `50ms`
    pub persist_debounce: Duration,

    pub conflict: ConflictPolicy,
}

impl GraphConfig {
    pub fn new(storage: StorageKind) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            oplog_window: DEFAULT_OPLOG_WINDOW,
            default_max_depth: DEFAULT_MAX_DEPTH,
            max_depth_limit: DEFAULT_MAX_DEPTH_LIMIT,
            storage,
            persist_debounce: DEFAULT_PERSIST_DEBOUNCE,
            conflict: ConflictPolicy::default(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(StorageKind::Memory)
    }

    pub fn file<P: Into<PathBuf>>(dir: P) -> Self {
        Self::new(StorageKind::File { dir: dir.into() })
    }

    pub fn blob(store: Arc<dyn BlobStore>) -> Self {
        Self::new(StorageKind::Blob(store))
    }

    pub fn auto<P: Into<PathBuf>>(dir: P, fallback: Arc<dyn BlobStore>) -> Self {
        Self::new(StorageKind::Auto {
            dir: dir.into(),
            fallback,
        })
    }

    pub fn with_name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_oplog_window(mut self, window: usize) -> Self {
        self.oplog_window = window;
        self
    }

    pub fn with_default_max_depth(mut self, depth: u32) -> Self {
        self.default_max_depth = depth;
        self
    }

    pub fn with_persist_debounce(mut self, debounce: Duration) -> Self {
        self.persist_debounce = debounce;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict = policy;
        self
    }

    /// Defaults overlaid with `GENOSDB_DIR`, `GENOSDB_NAME`, `GENOSDB_OPLOG_WINDOW` and
    /// `GENOSDB_MAX_DEPTH`. Unparseable numbers are reported, not ignored.
    pub fn from_env() -> Result<Self, GraphDbError> {
        let mut cfg = match env::var("GENOSDB_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Self::file(dir),
            _ => Self::in_memory(),
        };
        if let Ok(name) = env::var("GENOSDB_NAME") {
            cfg.name = name;
        }
        if let Ok(raw) = env::var("GENOSDB_OPLOG_WINDOW") {
            cfg.oplog_window = raw.trim().parse().map_err(|_| {
                GraphDbError::invalid_input(format!("GENOSDB_OPLOG_WINDOW={raw} is not a number"))
            })?;
        }
        if let Ok(raw) = env::var("GENOSDB_MAX_DEPTH") {
            cfg.default_max_depth = raw.trim().parse().map_err(|_| {
                GraphDbError::invalid_input(format!("GENOSDB_MAX_DEPTH={raw} is not a number"))
            })?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), GraphDbError> {
        if self.name.trim().is_empty() {
            return Err(GraphDbError::invalid_input("database name must be set"));
        }
        if self.oplog_window == 0 {
            return Err(GraphDbError::invalid_input("oplog_window must be at least 1"));
        }
        self.check_depth(self.default_max_depth)?;
        Ok(())
    }

    /// Accepts depths in `1..=max_depth_limit`.
    pub fn check_depth(&self, depth: u32) -> Result<u32, GraphDbError> {
        if depth == 0 || depth > self.max_depth_limit {
            return Err(GraphDbError::invalid_query(format!(
                "maxDepth {depth} outside 1..={}",
                self.max_depth_limit
            )));
        }
        Ok(depth)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
