//! Local-first embeddable graph database.
//!
//! Nodes and directed edges live in memory behind one lock, every mutation is
//! recorded in a bounded oplog, snapshots are saved in the background to a durable
//! file or a blob store, and mutations replicate to other instances through an
//! injected message bus or peer batches merged under a conflict policy.
//!
//! ```rust
//! use genosdb::{Filter, GraphDb, Query};
//! use serde_json::json;
//!
//! let db = GraphDb::in_memory().unwrap();
//! db.put("ann", json!({ "type": "user", "name": "Ann" })).unwrap();
//! db.put("bob", json!({ "type": "friend", "name": "Bob" })).unwrap();
//! db.link("ann", "bob", json!({})).unwrap();
//!
//! let query = Query::builder()
//!     .eq("name", "Ann")
//!     .edge(Filter::all().eq("type", "friend"))
//!     .build();
//! assert_eq!(db.map(&query).unwrap()[0].id, "bob");
//! ```
//!
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod bench_utils;
pub mod bus;
pub mod client;
pub mod codec;
pub mod config;
pub mod errors;
pub mod graph;
pub mod hub;
pub mod index;
pub mod oplog;
pub mod persistence;
pub mod query;
pub mod storage;
pub mod sync;

pub use crate::bus::{BroadcastChannel, BroadcastEndpoint, MessageBus, NoopBus};
pub use crate::config::{ConflictPolicy, GraphConfig, StorageKind};
pub use crate::errors::GraphDbError;
pub use crate::graph::{
    EdgeRecord, GetOptions, GetResult, GraphDb, GraphStats, MapResult, NodeRecord, Revision,
    edge_id,
};
pub use crate::hub::{Subscription, SubscriptionId};
pub use crate::oplog::Operation;
pub use crate::query::{Filter, MapOptions, Predicate, Query, QueryBuilder};
pub use crate::storage::{BlobStore, MemoryBlobStore};
pub use crate::sync::{
    ApplyOutcome, ArrivalOrder, ConflictResolver, LastWriteWins, Resolution, SyncReport,
};
