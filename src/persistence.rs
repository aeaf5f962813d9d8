//! Background snapshot writer.
//!
//! Mutations only send a `Dirty` signal. The worker waits at most `debounce` after
//! the first signal of a burst, then encodes the whole state under a read lock and
//! hands the bytes to the storage backend. Failures are logged and the next burst
//! tries again; they never reach the mutating caller.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::{codec, errors::GraphDbError, graph::GraphState, storage::StorageAdapter};

enum PersistMsg {
    Dirty,
    Flush(Sender<()>),
    Shutdown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub saves: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    saves: AtomicU64,
    failures: AtomicU64,
}

pub struct Persister {
    tx: Sender<PersistMsg>,
    handle: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl Persister {
    pub fn spawn(
        state: Arc<RwLock<GraphState>>,
        storage: Arc<dyn StorageAdapter>,
        debounce: Duration,
    ) -> Result<Self, GraphDbError> {
        let (tx, rx) = unbounded();
        let counters = Arc::new(Counters::default());
        let worker_counters = counters.clone();
        let handle = thread::Builder::new()
            .name("genosdb-persist".into())
            .spawn(move || worker_loop(rx, state, storage, debounce, worker_counters))
            .map_err(|e| GraphDbError::storage(format!("cannot spawn persistence worker: {e}")))?;
        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
            counters,
        })
    }

    pub fn mark_dirty(&self) {
        if self.tx.send(PersistMsg::Dirty).is_err() {
            warn!("persistence worker is gone, change will not be saved");
        }
    }

    /// Blocks until every change signalled so far has been written (or failed).
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(PersistMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    pub fn stats(&self) -> PersistStats {
        PersistStats {
            saves: self.counters.saves.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Writes pending changes and stops the worker.
    pub fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let _ = self.tx.send(PersistMsg::Shutdown);
        if handle.join().is_err() {
            warn!("persistence worker panicked");
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Encodes `state` and writes it through `storage`, returning the byte count.
pub fn save_state(
    state: &RwLock<GraphState>,
    storage: &dyn StorageAdapter,
) -> Result<usize, GraphDbError> {
    let bytes = {
        let guard = state.read();
        codec::encode_state(&guard)?
    };
    storage.write(&bytes)?;
    Ok(bytes.len())
}

fn worker_loop(
    rx: Receiver<PersistMsg>,
    state: Arc<RwLock<GraphState>>,
    storage: Arc<dyn StorageAdapter>,
    debounce: Duration,
    counters: Arc<Counters>,
) {
    let save = || match save_state(&state, storage.as_ref()) {
        Ok(len) => {
            counters.saves.fetch_add(1, Ordering::Relaxed);
            debug!(bytes = len, backend = storage.kind(), "snapshot saved");
        }
        Err(err) => {
            counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, backend = storage.kind(), "snapshot save skipped");
        }
    };

    let mut deadline: Option<Instant> = None;
    loop {
        let msg = match deadline {
            Some(at) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => {
                    save();
                    deadline = None;
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    save();
                    return;
                }
            },
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => return,
            },
        };
        match msg {
            PersistMsg::Dirty => {
                deadline.get_or_insert_with(|| Instant::now() + debounce);
            }
            PersistMsg::Flush(ack) => {
                if deadline.take().is_some() {
                    save();
                }
                let _ = ack.send(());
            }
            PersistMsg::Shutdown => {
                if deadline.is_some() {
                    save();
                }
                return;
            }
        }
    }
}
