//! Merging operations that originate elsewhere (other tabs or peers).
//!
//! Every incoming operation passes through a [`ConflictResolver`] before it touches
//! local state. With the default [`LastWriteWins`] puts and links converge: replicas
//! that have seen the same puts and links, in any order, hold the same records. With
//! [`ArrivalOrder`] the last operation to arrive wins regardless of its stamps.
//!
//! Removes and clears carry no version, so they are compared as if they were the
//! newest revision at their timestamp: a remove beats a put with the same timestamp.
//! Each remove leaves a tombstone on its node id and each clear raises a clear mark.
//! Puts and links that do not outrank them are discarded, so a remove that arrives
//! before the write it supersedes still wins. Tombstones are bounded by the oplog
//! window (see [`GraphState`]); a write older than an evicted tombstone can come back.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::ConflictPolicy,
    errors::GraphDbError,
    graph::{GraphDb, GraphInner, GraphState, NodeRecord, Revision, tombstone},
    oplog::Operation,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    TakeIncoming,
}

pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, local: Revision, incoming: Revision) -> Resolution;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LastWriteWins;

impl ConflictResolver for LastWriteWins {
    fn resolve(&self, local: Revision, incoming: Revision) -> Resolution {
        if incoming > local {
            Resolution::TakeIncoming
        } else {
            Resolution::KeepLocal
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ArrivalOrder;

impl ConflictResolver for ArrivalOrder {
    fn resolve(&self, _local: Revision, _incoming: Revision) -> Resolution {
        Resolution::TakeIncoming
    }
}

pub fn resolver_for(policy: ConflictPolicy) -> Arc<dyn ConflictResolver> {
    match policy {
        ConflictPolicy::LastWriteWins => Arc::new(LastWriteWins),
        ConflictPolicy::ArrivalOrder => Arc::new(ArrivalOrder),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Local state now reflects the operation.
    Applied,
    /// Local state already held something newer; nothing changed.
    Superseded,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: usize,
    pub superseded: usize,
    pub rejected: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.applied + self.superseded + self.rejected
    }
}

/// Node-level effects of a merge, for subscriber notification.
pub(crate) type NodeChanges = Vec<(String, Option<NodeRecord>)>;

fn outranks(resolver: &dyn ConflictResolver, mark: Option<Revision>, incoming: Revision) -> bool {
    mark.is_none_or(|mark| resolver.resolve(mark, incoming) == Resolution::TakeIncoming)
}

/// Applies `op` to `state` without touching the oplog.
pub(crate) fn merge(
    state: &mut GraphState,
    op: &Operation,
    resolver: &dyn ConflictResolver,
) -> Result<(ApplyOutcome, NodeChanges), GraphDbError> {
    op.validate()?;
    match op {
        Operation::Put { node } => {
            let incoming = node.revision();
            let wins = outranks(resolver, state.clear_mark(), incoming)
                && outranks(resolver, state.tombstone_of(&node.id), incoming)
                && outranks(resolver, state.node(&node.id).map(NodeRecord::revision), incoming);
            if !wins {
                return Ok((ApplyOutcome::Superseded, Vec::new()));
            }
            state.insert_node(node.clone());
            Ok((
                ApplyOutcome::Applied,
                vec![(node.id.clone(), Some(node.clone()))],
            ))
        }
        Operation::Link { edge } => {
            let incoming = edge.revision();
            let wins = outranks(resolver, state.clear_mark(), incoming)
                && outranks(resolver, state.tombstone_of(&edge.from), incoming)
                && outranks(resolver, state.tombstone_of(&edge.to), incoming)
                && outranks(resolver, state.edge(&edge.id).map(|e| e.revision()), incoming);
            if !wins {
                return Ok((ApplyOutcome::Superseded, Vec::new()));
            }
            state.insert_edge(edge.clone());
            Ok((ApplyOutcome::Applied, Vec::new()))
        }
        Operation::Remove { id, timestamp } => {
            let incoming = tombstone(*timestamp);
            let stale =
                |local: Revision| resolver.resolve(local, incoming) == Resolution::TakeIncoming;
            let advanced = state.record_tombstone(id, *timestamp);
            let detached = state.detach_edges_if(id, stale);
            let node_stale = state.node(id).map(|n| stale(n.revision()));
            let mut changes = Vec::new();
            if node_stale == Some(true) {
                state.take_node(id);
                changes.push((id.clone(), None));
            }
            let applied = match node_stale {
                Some(removed) => removed || !detached.is_empty(),
                None => advanced || !detached.is_empty(),
            };
            let outcome = if applied {
                ApplyOutcome::Applied
            } else {
                ApplyOutcome::Superseded
            };
            Ok((outcome, changes))
        }
        Operation::Clear { timestamp } => {
            let incoming = tombstone(*timestamp);
            let advanced = state.record_clear(*timestamp);
            let before = state.edge_count();
            let removed = state
                .clear_if(|local| resolver.resolve(local, incoming) == Resolution::TakeIncoming);
            let outcome = if advanced || !removed.is_empty() || state.edge_count() != before {
                ApplyOutcome::Applied
            } else {
                ApplyOutcome::Superseded
            };
            Ok((outcome, removed.into_iter().map(|id| (id, None)).collect()))
        }
    }
}

impl GraphInner {
    pub(crate) fn apply_operation(&self, op: &Operation) -> Result<ApplyOutcome, GraphDbError> {
        let (outcome, changes) = {
            let mut state = self.state.write();
            merge(&mut state, op, self.resolver.as_ref())?
        };
        if outcome == ApplyOutcome::Applied {
            self.after_change(None, changes);
        }
        Ok(outcome)
    }
}

impl GraphDb {
    /// Merges one foreign operation. Subscribers are notified, but the operation is
    /// neither appended to the oplog nor published again.
    pub fn apply_operation(&self, op: &Operation) -> Result<ApplyOutcome, GraphDbError> {
        self.inner.apply_operation(op)
    }

    /// Merges a batch from a peer in order. Applied operations are appended to the
    /// local oplog and published on the bus so they travel on; malformed ones are
    /// logged and skipped.
    pub fn sync_with_peer<I>(&self, operations: I) -> SyncReport
    where
        I: IntoIterator<Item = Operation>,
    {
        let mut report = SyncReport::default();
        for op in operations {
            let merged = {
                let mut state = self.inner.state.write();
                let merged = merge(&mut state, &op, self.inner.resolver.as_ref());
                if let Ok((ApplyOutcome::Applied, _)) = &merged {
                    state.oplog_mut().append(op.clone());
                }
                merged
            };
            match merged {
                Ok((ApplyOutcome::Applied, changes)) => {
                    report.applied += 1;
                    self.inner.after_change(Some(&op), changes);
                }
                Ok((ApplyOutcome::Superseded, _)) => report.superseded += 1,
                Err(err) => {
                    report.rejected += 1;
                    warn!(error = %err, kind = op.kind(), "rejected peer operation");
                }
            }
        }
        debug!(
            applied = report.applied,
            superseded = report.superseded,
            rejected = report.rejected,
            "peer batch merged"
        );
        report
    }

    /// Decodes each entry on its own; entries that are not operations count as rejected.
    pub fn sync_with_peer_json(&self, operations: &[Value]) -> SyncReport {
        let mut decoded = Vec::with_capacity(operations.len());
        let mut undecodable = 0;
        for raw in operations {
            match serde_json::from_value::<Operation>(raw.clone()) {
                Ok(op) => decoded.push(op),
                Err(err) => {
                    undecodable += 1;
                    warn!(error = %err, "undecodable peer operation");
                }
            }
        }
        let mut report = self.sync_with_peer(decoded);
        report.rejected += undecodable;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge_id;
    use serde_json::{Map, json};

    fn put(id: &str, timestamp: u64, version: u64, name: &str) -> Operation {
        Operation::Put {
            node: NodeRecord {
                id: id.into(),
                data: json!({ "name": name }),
                timestamp,
                version,
                meta: Map::new(),
            },
        }
    }

    #[test]
    fn test_lww_discards_older_put() {
        let mut state = GraphState::new(10);
        merge(&mut state, &put("a", 10, 1, "new"), &LastWriteWins).unwrap();
        let (outcome, changes) = merge(&mut state, &put("a", 5, 1, "old"), &LastWriteWins).unwrap();
        assert_eq!(outcome, ApplyOutcome::Superseded);
        assert!(changes.is_empty());
        assert_eq!(state.node("a").unwrap().data, json!({ "name": "new" }));
    }

    #[test]
    fn test_lww_breaks_timestamp_ties_by_version() {
        let mut state = GraphState::new(10);
        merge(&mut state, &put("a", 10, 1, "v1"), &LastWriteWins).unwrap();
        merge(&mut state, &put("a", 10, 2, "v2"), &LastWriteWins).unwrap();
        let (outcome, _) = merge(&mut state, &put("a", 10, 2, "dup"), &LastWriteWins).unwrap();
        assert_eq!(outcome, ApplyOutcome::Superseded);
        assert_eq!(state.node("a").unwrap().data, json!({ "name": "v2" }));
    }

    #[test]
    fn test_arrival_order_takes_everything() {
        let mut state = GraphState::new(10);
        merge(&mut state, &put("a", 10, 1, "new"), &ArrivalOrder).unwrap();
        merge(&mut state, &put("a", 5, 1, "old"), &ArrivalOrder).unwrap();
        assert_eq!(state.node("a").unwrap().data, json!({ "name": "old" }));
    }

    #[test]
    fn test_remove_loses_to_newer_put_and_wins_ties() {
        let mut state = GraphState::new(10);
        merge(&mut state, &put("a", 10, 3, "x"), &LastWriteWins).unwrap();
        let stale = Operation::Remove {
            id: "a".into(),
            timestamp: 9,
        };
        assert_eq!(
            merge(&mut state, &stale, &LastWriteWins).unwrap().0,
            ApplyOutcome::Superseded
        );
        let same_tick = Operation::Remove {
            id: "a".into(),
            timestamp: 10,
        };
        let (outcome, changes) = merge(&mut state, &same_tick, &LastWriteWins).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(changes, vec![("a".to_string(), None)]);
        assert!(state.node("a").is_none());
    }

    #[test]
    fn test_clear_spares_newer_records() {
        let mut state = GraphState::new(10);
        merge(&mut state, &put("old", 1, 1, "o"), &LastWriteWins).unwrap();
        merge(&mut state, &put("new", 50, 1, "n"), &LastWriteWins).unwrap();
        let (_, changes) =
            merge(&mut state, &Operation::Clear { timestamp: 20 }, &LastWriteWins).unwrap();
        assert_eq!(changes, vec![("old".to_string(), None)]);
        assert!(state.node("new").is_some());
    }

    #[test]
    fn test_malformed_link_is_rejected() {
        let mut state = GraphState::new(10);
        let op = Operation::Link {
            edge: crate::graph::EdgeRecord {
                id: edge_id("a", "c"),
                from: "a".into(),
                to: "b".into(),
                data: json!(null),
                timestamp: 1,
            },
        };
        assert!(merge(&mut state, &op, &LastWriteWins).is_err());
        assert_eq!(state.edge_count(), 0);
    }
}
