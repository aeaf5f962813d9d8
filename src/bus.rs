//! Cross-process message bus.
//!
//! The database publishes every local mutation on the bus it was opened with and
//! applies what other endpoints publish. Single-process embeddings use [`NoopBus`];
//! [`BroadcastChannel`] connects several databases living in one process (tabs,
//! workers, tests) the way a browser broadcast channel would.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::oplog::Operation;

pub trait MessageBus: Send + Sync {
    /// Sends `op` to every other endpoint. Must not block.
    fn publish(&self, op: &Operation);

    /// Hands out the receiving side once; later calls return `None`.
    fn take_receiver(&self) -> Option<Receiver<Operation>>;
}

#[derive(Debug, Default)]
pub struct NoopBus;

impl MessageBus for NoopBus {
    fn publish(&self, _op: &Operation) {}

    fn take_receiver(&self) -> Option<Receiver<Operation>> {
        None
    }
}

#[derive(Default)]
struct ChannelInner {
    next_id: AtomicU64,
    members: RwLock<Vec<(u64, Sender<Operation>)>>,
}

/// In-process fan-out channel. Each [`BroadcastEndpoint`] receives what the others
/// publish, never its own messages.
#[derive(Clone, Default)]
pub struct BroadcastChannel {
    inner: Arc<ChannelInner>,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self) -> BroadcastEndpoint {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded();
        self.inner.members.write().push((id, tx));
        BroadcastEndpoint {
            id,
            channel: self.inner.clone(),
            receiver: Mutex::new(Some(rx)),
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.inner.members.read().len()
    }
}

pub struct BroadcastEndpoint {
    id: u64,
    channel: Arc<ChannelInner>,
    receiver: Mutex<Option<Receiver<Operation>>>,
}

impl BroadcastEndpoint {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl MessageBus for BroadcastEndpoint {
    fn publish(&self, op: &Operation) {
        let mut dead = Vec::new();
        for (id, tx) in self.channel.members.read().iter() {
            if *id == self.id {
                continue;
            }
            if tx.send(op.clone()).is_err() {
                dead.push(*id);
            }
        }
        if !dead.is_empty() {
            debug!(endpoints = ?dead, "pruning disconnected bus endpoints");
            self.channel
                .members
                .write()
                .retain(|(id, _)| !dead.contains(id));
        }
    }

    fn take_receiver(&self) -> Option<Receiver<Operation>> {
        self.receiver.lock().take()
    }
}

impl Drop for BroadcastEndpoint {
    fn drop(&mut self) {
        self.channel.members.write().retain(|(id, _)| *id != self.id);
    }
}
