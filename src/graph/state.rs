//! In-memory graph state guarded by the single database lock.

use std::collections::VecDeque;

use ahash::AHashMap;
use serde_json::{Map, Value};

use crate::{index::IncidenceIndex, oplog::Oplog};

use super::types::{EdgeRecord, NodeRecord, Revision, edge_id};

/// Revision a remove or clear stamped at `timestamp` is compared as: it outranks
/// every write carrying the same timestamp.
pub fn tombstone(timestamp: u64) -> Revision {
    Revision {
        timestamp,
        version: u64::MAX,
    }
}

/// Nodes, edges, their incidence index and the oplog, plus the removal marks that
/// keep late stale writes out.
///
/// `tombstones` holds the newest remove timestamp per node id. It keeps at most as
/// many ids as the oplog window; the oldest marks are evicted first. `cleared` is
/// the newest clear timestamp seen and is never evicted.
///
/// Methods here only change memory; notification, broadcast and persistence are
/// driven by [`super::GraphDb`] once the lock is released.
#[derive(Clone, Debug, Default)]
pub struct GraphState {
    pub(crate) nodes: AHashMap<String, NodeRecord>,
    pub(crate) edges: AHashMap<String, EdgeRecord>,
    pub(crate) index: IncidenceIndex,
    pub(crate) oplog: Oplog,
    pub(crate) tombstones: AHashMap<String, u64>,
    tombstone_order: VecDeque<String>,
    pub(crate) cleared: Option<u64>,
}

impl GraphState {
    pub fn new(oplog_window: usize) -> Self {
        Self {
            oplog: Oplog::new(oplog_window),
            ..Self::default()
        }
    }

    pub fn from_parts(nodes: Vec<NodeRecord>, edges: Vec<EdgeRecord>, oplog: Oplog) -> Self {
        let mut state = Self {
            nodes: AHashMap::with_capacity(nodes.len()),
            edges: AHashMap::with_capacity(edges.len()),
            oplog,
            ..Self::default()
        };
        for node in nodes {
            state.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            state.insert_edge(edge);
        }
        state
    }

    /// Restores persisted removal marks on top of a rebuilt state.
    pub fn with_marks(mut self, tombstones: Vec<(String, u64)>, cleared: Option<u64>) -> Self {
        for (id, timestamp) in tombstones {
            self.record_tombstone(&id, timestamp);
        }
        if let Some(timestamp) = cleared {
            self.record_clear(timestamp);
        }
        self
    }

    /// Writes a new revision of `id` that outranks whatever it replaces: the
    /// timestamp is `now` unless the stored record, a tombstone or the clear mark
    /// is at or past it, and the version is the previous version plus one.
    pub fn put_node(
        &mut self,
        id: &str,
        data: Value,
        meta: Map<String, Value>,
        now: u64,
    ) -> NodeRecord {
        let previous = self.nodes.get(id);
        let version = previous.map_or(0, |n| n.version) + 1;
        let floor = [
            previous.map(|n| n.timestamp),
            self.tombstones.get(id).copied(),
            self.cleared,
        ]
        .into_iter()
        .flatten()
        .max();
        let record = NodeRecord {
            id: id.to_string(),
            data,
            timestamp: stamp_after(now, floor),
            version,
            meta,
        };
        self.nodes.insert(record.id.clone(), record.clone());
        record
    }

    /// Stores a replicated record verbatim.
    pub fn insert_node(&mut self, record: NodeRecord) {
        self.nodes.insert(record.id.clone(), record);
    }

    /// Creates or replaces the edge `from -> to`, stamped past the edge it replaces,
    /// both endpoint tombstones and the clear mark.
    pub fn link(&mut self, from: &str, to: &str, data: Value, now: u64) -> EdgeRecord {
        let id = edge_id(from, to);
        let floor = [
            self.edges.get(&id).map(|e| e.timestamp),
            self.tombstones.get(from).copied(),
            self.tombstones.get(to).copied(),
            self.cleared,
        ]
        .into_iter()
        .flatten()
        .max();
        let record = EdgeRecord {
            id,
            from: from.to_string(),
            to: to.to_string(),
            data,
            timestamp: stamp_after(now, floor),
        };
        self.insert_edge(record.clone());
        record
    }

    pub fn insert_edge(&mut self, edge: EdgeRecord) {
        self.index.insert(&edge.from, &edge.to, &edge.id);
        self.edges.insert(edge.id.clone(), edge);
    }

    /// Deletes the node and every edge touching it, leaving a tombstone. The remove
    /// is stamped at `now` or later, so it outranks the node and its edges. Returns
    /// `None` if the node was absent.
    pub fn remove_node(&mut self, id: &str, now: u64) -> Option<(u64, Vec<EdgeRecord>)> {
        let node = self.nodes.remove(id)?;
        let newest = self
            .incident_edges(id)
            .map(|e| e.timestamp)
            .chain([node.timestamp])
            .max();
        let timestamp = now.max(newest.unwrap_or(0));
        let removed = self.detach_edges_if(id, |_| true);
        self.record_tombstone(id, timestamp);
        Some((timestamp, removed))
    }

    /// Drops the node record alone; edges and tombstones are left to the caller.
    pub fn take_node(&mut self, id: &str) -> Option<NodeRecord> {
        self.nodes.remove(id)
    }

    /// Drops the edges touching `id` whose revision satisfies `stale`.
    pub fn detach_edges_if<F>(&mut self, id: &str, stale: F) -> Vec<EdgeRecord>
    where
        F: Fn(Revision) -> bool,
    {
        let doomed: Vec<String> = self
            .incident_edges(id)
            .filter(|e| stale(e.revision()))
            .map(|e| e.id.clone())
            .collect();
        let mut removed = Vec::with_capacity(doomed.len());
        for edge_id in doomed {
            if let Some(edge) = self.edges.remove(&edge_id) {
                self.index.remove(&edge.from, &edge.to, &edge.id);
                removed.push(edge);
            }
        }
        removed
    }

    /// Raises the tombstone of `id` to `timestamp`; returns whether it moved.
    pub fn record_tombstone(&mut self, id: &str, timestamp: u64) -> bool {
        match self.tombstones.get_mut(id) {
            Some(existing) if *existing >= timestamp => false,
            Some(existing) => {
                *existing = timestamp;
                true
            }
            None => {
                self.tombstones.insert(id.to_string(), timestamp);
                self.tombstone_order.push_back(id.to_string());
                while self.tombstone_order.len() > self.oplog.window() {
                    if let Some(evicted) = self.tombstone_order.pop_front() {
                        self.tombstones.remove(&evicted);
                    }
                }
                true
            }
        }
    }

    /// Raises the clear mark to `timestamp`; returns whether it moved.
    pub fn record_clear(&mut self, timestamp: u64) -> bool {
        if self.cleared.is_some_and(|seen| seen >= timestamp) {
            return false;
        }
        self.cleared = Some(timestamp);
        true
    }

    pub fn tombstone_of(&self, id: &str) -> Option<Revision> {
        self.tombstones.get(id).copied().map(tombstone)
    }

    pub fn clear_mark(&self) -> Option<Revision> {
        self.cleared.map(tombstone)
    }

    /// Tombstones oldest first, for snapshots.
    pub fn tombstones(&self) -> impl Iterator<Item = (&str, u64)> {
        self.tombstone_order
            .iter()
            .filter_map(|id| self.tombstones.get(id).map(|ts| (id.as_str(), *ts)))
    }

    /// Drops the nodes and edges whose revision satisfies `stale`; returns the removed
    /// node ids. The oplog is left alone.
    pub fn clear_if<F>(&mut self, stale: F) -> Vec<String>
    where
        F: Fn(Revision) -> bool,
    {
        let mut removed: Vec<String> = self
            .nodes
            .values()
            .filter(|n| stale(n.revision()))
            .map(|n| n.id.clone())
            .collect();
        removed.sort();
        for id in &removed {
            self.nodes.remove(id);
        }
        let stale_edges: Vec<EdgeRecord> = self
            .edges
            .values()
            .filter(|e| stale(e.revision()))
            .cloned()
            .collect();
        for edge in stale_edges {
            self.edges.remove(&edge.id);
            self.index.remove(&edge.from, &edge.to, &edge.id);
        }
        removed
    }

    /// Empties nodes, edges and the oplog and raises the clear mark. The clear is
    /// stamped at `now` or at the newest record it drops. Returns that timestamp
    /// and the ids of the nodes that existed.
    pub fn clear(&mut self, now: u64) -> (u64, Vec<String>) {
        let newest = self
            .nodes
            .values()
            .map(|n| n.timestamp)
            .chain(self.edges.values().map(|e| e.timestamp))
            .max();
        let timestamp = now.max(newest.unwrap_or(0));
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        self.nodes.clear();
        self.edges.clear();
        self.index.clear();
        self.oplog.clear();
        self.record_clear(timestamp);
        (timestamp, ids)
    }

    pub fn node(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&EdgeRecord> {
        self.edges.get(id)
    }

    pub fn incident_edges<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a EdgeRecord> + 'a {
        let ids: Vec<&'a str> = self.index.edges_of(id).collect();
        ids.into_iter().filter_map(move |eid| self.edges.get(eid))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn oplog(&self) -> &Oplog {
        &self.oplog
    }

    pub fn oplog_mut(&mut self) -> &mut Oplog {
        &mut self.oplog
    }
}

fn stamp_after(now: u64, floor: Option<u64>) -> u64 {
    match floor {
        Some(floor) if floor >= now => floor.saturating_add(1),
        _ => now,
    }
}
