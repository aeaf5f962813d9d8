//! Core GraphDb struct: construction, teardown and change fan-out.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::{
    bus::{MessageBus, NoopBus},
    codec,
    config::GraphConfig,
    errors::GraphDbError,
    hub::SubscriptionHub,
    oplog::{Operation, Oplog},
    persistence::{PersistStats, Persister, save_state},
    storage::{StorageAdapter, open_storage},
    sync::{ConflictResolver, NodeChanges, resolver_for},
};

use super::GraphState;

const LISTENER_POLL: Duration = Duration::from_millis(100);

/// State shared between the public handle and the bus listener thread.
pub(crate) struct GraphInner {
    pub(crate) state: Arc<RwLock<GraphState>>,
    pub(crate) hub: SubscriptionHub,
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) config: GraphConfig,
    pub(crate) resolver: Arc<dyn ConflictResolver>,
    pub(crate) storage: Arc<dyn StorageAdapter>,
    pub(crate) persister: Persister,
}

/// Embedded local-first graph database.
///
/// All reads and writes go through one lock around [`GraphState`]; a mutation is
/// never observed half-applied. Persistence, broadcast and subscriber notification
/// happen after the lock is released and never fail the mutating call.
pub struct GraphDb {
    pub(crate) inner: Arc<GraphInner>,
    listener: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl GraphDb {
    pub fn open(config: GraphConfig) -> Result<Self, GraphDbError> {
        Self::open_with_bus(config, Arc::new(NoopBus))
    }

    pub fn in_memory() -> Result<Self, GraphDbError> {
        Self::open(GraphConfig::in_memory())
    }

    /// Opens a database that publishes its mutations on `bus` and applies what the
    /// other endpoints of `bus` publish.
    pub fn open_with_bus(
        config: GraphConfig,
        bus: Arc<dyn MessageBus>,
    ) -> Result<Self, GraphDbError> {
        let resolver = resolver_for(config.conflict);
        Self::open_with(config, bus, resolver)
    }

    /// Like [`GraphDb::open_with_bus`] with a custom merge policy for foreign operations.
    pub fn open_with(
        config: GraphConfig,
        bus: Arc<dyn MessageBus>,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Result<Self, GraphDbError> {
        config.validate()?;
        let storage: Arc<dyn StorageAdapter> =
            Arc::from(open_storage(&config.name, &config.storage)?);
        let state = Arc::new(RwLock::new(load_state(
            storage.as_ref(),
            config.oplog_window,
        )));
        let persister = Persister::spawn(state.clone(), storage.clone(), config.persist_debounce)?;
        {
            let guard = state.read();
            info!(
                name = %config.name,
                backend = storage.kind(),
                nodes = guard.node_count(),
                edges = guard.edge_count(),
                "database opened"
            );
        }
        let inner = Arc::new(GraphInner {
            state,
            hub: SubscriptionHub::new(),
            bus,
            config,
            resolver,
            storage,
            persister,
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let listener = match inner.bus.take_receiver() {
            Some(rx) => Some(spawn_listener(inner.clone(), rx, shutdown.clone())?),
            None => None,
        };
        Ok(Self {
            inner,
            listener,
            shutdown,
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    /// Copy of the retained operations, oldest first.
    pub fn oplog(&self) -> Vec<Operation> {
        self.inner.state.read().oplog().to_vec()
    }

    /// Blocks until every change made so far has been handed to storage.
    pub fn flush(&self) {
        self.inner.persister.flush();
    }

    /// Saves synchronously, bypassing the background worker. Returns the byte count.
    pub fn save_now(&self) -> Result<usize, GraphDbError> {
        save_state(&self.inner.state, self.inner.storage.as_ref())
    }

    pub fn persist_stats(&self) -> PersistStats {
        self.inner.persister.stats()
    }
}

impl Drop for GraphDb {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.listener.take() {
            if handle.join().is_err() {
                warn!("bus listener panicked");
            }
        }
        self.inner.hub.clear();
        self.inner.persister.shutdown();
        debug!(name = %self.inner.config.name, "database closed");
    }
}

impl GraphInner {
    /// Runs the side effects of a committed change: schedules a save, publishes
    /// `op` when given, notifies node subscribers and re-runs live queries.
    pub(crate) fn after_change(&self, publish: Option<&Operation>, changes: NodeChanges) {
        self.persister.mark_dirty();
        if let Some(op) = publish {
            self.bus.publish(op);
        }
        for (id, record) in &changes {
            self.hub.notify_node(id, record.as_ref());
        }
        self.refresh_queries();
    }

    fn refresh_queries(&self) {
        if !self.hub.has_query_subscriptions() {
            return;
        }
        for subscription in self.hub.query_subscriptions().iter() {
            let results = self.run_query(&subscription.query, subscription.max_depth);
            subscription.deliver(&results);
        }
    }
}

fn load_state(storage: &dyn StorageAdapter, window: usize) -> GraphState {
    let bytes = match storage.read() {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return GraphState::new(window),
        Err(err) => {
            warn!(error = %err, backend = storage.kind(), "snapshot unreadable, starting empty");
            return GraphState::new(window);
        }
    };
    match codec::decode_snapshot(&bytes) {
        Ok(snapshot) => GraphState::from_parts(
            snapshot.nodes,
            snapshot.edges,
            Oplog::from_entries(snapshot.oplog, window),
        )
        .with_marks(snapshot.tombstones, snapshot.cleared),
        Err(err) => {
            warn!(error = %err, backend = storage.kind(), "snapshot corrupt, starting empty");
            GraphState::new(window)
        }
    }
}

fn spawn_listener(
    inner: Arc<GraphInner>,
    rx: Receiver<Operation>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, GraphDbError> {
    thread::Builder::new()
        .name("genosdb-bus".into())
        .spawn(move || {
            while !shutdown.load(Ordering::Acquire) {
                match rx.recv_timeout(LISTENER_POLL) {
                    Ok(op) => {
                        if let Err(err) = inner.apply_operation(&op) {
                            warn!(error = %err, kind = op.kind(), "dropping broadcast operation");
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .map_err(|e| GraphDbError::storage(format!("cannot spawn bus listener: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BlobStorage, MemoryBlobStore};
    use serde_json::json;

    #[test]
    fn test_load_state_ignores_garbage() {
        let store = Arc::new(MemoryBlobStore::new());
        let storage = BlobStorage::new(store, "g");
        storage.write(b"not a snapshot").unwrap();
        let state = load_state(&storage, 10);
        assert_eq!(state.node_count(), 0);
    }

    #[test]
    fn test_drop_flushes_pending_changes() {
        let store = Arc::new(MemoryBlobStore::new());
        {
            let db = GraphDb::open(
                GraphConfig::blob(store.clone()).with_persist_debounce(Duration::from_secs(60)),
            )
            .unwrap();
            db.put("a", json!({ "k": 1 })).unwrap();
        }
        assert_eq!(store.len(), 1);
    }
}
