//! Introspection for operational tooling.

use serde::Serialize;

use crate::index::IndexStats;

use super::GraphDb;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub oplog_len: usize,
    /// Rough in-memory footprint: serialized size of every record and operation.
    pub approx_bytes: usize,
    pub index: IndexStats,
    pub tombstones: usize,
    pub node_subscriptions: usize,
    pub query_subscriptions: usize,
    pub storage: &'static str,
}

impl GraphDb {
    pub fn stats(&self) -> GraphStats {
        let state = self.inner.state.read();
        let approx_bytes = state.nodes().map(json_len).sum::<usize>()
            + state.edges().map(json_len).sum::<usize>()
            + state.oplog().iter().map(json_len).sum::<usize>();
        GraphStats {
            nodes: state.node_count(),
            edges: state.edge_count(),
            oplog_len: state.oplog().len(),
            approx_bytes,
            index: state.index.stats(),
            tombstones: state.tombstones.len(),
            node_subscriptions: self.inner.hub.node_subscription_count(),
            query_subscriptions: self.inner.hub.query_subscription_count(),
            storage: self.inner.storage.kind(),
        }
    }
}

fn json_len<T: Serialize>(value: T) -> usize {
    serde_json::to_vec(&value).map_or(0, |bytes| bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hub::SubscriptionId, query::Query};
    use serde_json::json;

    #[test]
    fn test_stats_track_counts() {
        let db = GraphDb::in_memory().unwrap();
        let empty = db.stats();
        assert_eq!(empty.approx_bytes, 0);
        assert_eq!(empty.storage, "memory");

        db.put("a", json!({ "name": "Ann" })).unwrap();
        db.link("a", "b", json!({})).unwrap();
        let sub = db
            .map_with(
                &Query::all(),
                crate::query::MapOptions::new().subscribe(|_| {}),
            )
            .unwrap()
            .subscription
            .unwrap();
        assert_ne!(sub.id(), SubscriptionId(0));

        let stats = db.stats();
        assert_eq!(stats.nodes, 1);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.oplog_len, 2);
        assert_eq!(stats.query_subscriptions, 1);
        assert_eq!(
            stats.index,
            IndexStats {
                nodes: 2,
                entries: 2
            }
        );

        db.remove("a");
        let after = db.stats();
        assert_eq!(after.tombstones, 1);
        assert_eq!(after.index, IndexStats::default());
        assert!(stats.approx_bytes > empty.approx_bytes);
    }
}
