//! Subscription hub.
//!
//! Node subscribers receive the new record of one id (or `None` once it is gone).
//! Query subscribers receive the complete result set of their query, recomputed
//! after every change anywhere in the graph. That recomputation is a full query run
//! per mutation per subscriber: fine for client-sized datasets, linear in the graph
//! size for everything else.
//!
//! Callbacks are always invoked without any hub or graph lock held, and each one is
//! isolated: a panicking callback is logged and the remaining callbacks still run.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use ahash::AHashMap;
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use tracing::warn;

use crate::{graph::NodeRecord, query::Query};

pub type NodeCallback = Arc<dyn Fn(Option<&NodeRecord>) + Send + Sync>;
pub type QueryCallback = Arc<dyn Fn(&[NodeRecord]) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Handle returned by subscribing calls; pass it to `unsubscribe`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
    target: SubscriptionTarget,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum SubscriptionTarget {
    Node(String),
    Query,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The watched node id, for node subscriptions.
    pub fn node_id(&self) -> Option<&str> {
        match &self.target {
            SubscriptionTarget::Node(id) => Some(id),
            SubscriptionTarget::Query => None,
        }
    }
}

/// A registered live query: the query, its resolved depth and the callback.
pub struct QuerySubscription {
    pub id: SubscriptionId,
    pub query: Query,
    pub max_depth: u32,
    callback: QueryCallback,
}

impl QuerySubscription {
    pub fn deliver(&self, results: &[NodeRecord]) {
        let callback = &self.callback;
        if catch_unwind(AssertUnwindSafe(|| callback(results))).is_err() {
            warn!(subscription = self.id.0, "query subscriber panicked");
        }
    }
}

#[derive(Default)]
pub struct SubscriptionHub {
    next_id: AtomicU64,
    nodes: RwLock<AHashMap<String, Vec<(SubscriptionId, NodeCallback)>>>,
    queries: ArcSwap<Vec<Arc<QuerySubscription>>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn subscribe_node(&self, node_id: &str, callback: NodeCallback) -> Subscription {
        let id = self.allocate();
        self.nodes
            .write()
            .entry(node_id.to_string())
            .or_default()
            .push((id, callback));
        Subscription {
            id,
            target: SubscriptionTarget::Node(node_id.to_string()),
        }
    }

    pub fn subscribe_query(
        &self,
        query: Query,
        max_depth: u32,
        callback: QueryCallback,
    ) -> Subscription {
        let id = self.allocate();
        let entry = Arc::new(QuerySubscription {
            id,
            query,
            max_depth,
            callback,
        });
        self.queries.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(entry.clone());
            next
        });
        Subscription {
            id,
            target: SubscriptionTarget::Query,
        }
    }

    /// Returns `false` when the subscription was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        match &subscription.target {
            SubscriptionTarget::Node(node_id) => {
                let mut nodes = self.nodes.write();
                let Some(list) = nodes.get_mut(node_id) else {
                    return false;
                };
                let before = list.len();
                list.retain(|(id, _)| *id != subscription.id);
                let removed = list.len() != before;
                if list.is_empty() {
                    nodes.remove(node_id);
                }
                removed
            }
            SubscriptionTarget::Query => {
                let mut removed = false;
                self.queries.rcu(|current| {
                    let next: Vec<_> = current
                        .iter()
                        .filter(|q| q.id != subscription.id)
                        .cloned()
                        .collect();
                    removed = next.len() != current.len();
                    next
                });
                removed
            }
        }
    }

    /// Invokes every subscriber of `node_id` with `record`.
    pub fn notify_node(&self, node_id: &str, record: Option<&NodeRecord>) {
        let callbacks: Vec<(SubscriptionId, NodeCallback)> = match self.nodes.read().get(node_id) {
            Some(list) => list.clone(),
            None => return,
        };
        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(record))).is_err() {
                warn!(subscription = id.0, node = node_id, "node subscriber panicked");
            }
        }
    }

    /// Point-in-time list of query subscriptions; later changes do not affect it.
    pub fn query_subscriptions(&self) -> Arc<Vec<Arc<QuerySubscription>>> {
        self.queries.load_full()
    }

    pub fn has_query_subscriptions(&self) -> bool {
        !self.queries.load().is_empty()
    }

    pub fn node_subscription_count(&self) -> usize {
        self.nodes.read().values().map(Vec::len).sum()
    }

    pub fn query_subscription_count(&self) -> usize {
        self.queries.load().len()
    }

    /// Drops every subscription.
    pub fn clear(&self) {
        self.nodes.write().clear();
        self.queries.store(Arc::new(Vec::new()));
    }
}
