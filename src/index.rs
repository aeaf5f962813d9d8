use std::collections::BTreeSet;

use ahash::AHashMap;
use serde::Serialize;

/// Size of the incidence index: node ids indexed and edge references held.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub nodes: usize,
    pub entries: usize,
}

/// Maps every node id to the ids of the edges that touch it, in either direction.
///
/// Edge ids are kept ordered so traversal expands neighbours deterministically.
/// Dangling endpoints (ids with no stored node) are indexed like any other.
#[derive(Clone, Debug, Default)]
pub struct IncidenceIndex {
    inner: AHashMap<String, BTreeSet<String>>,
}

impl IncidenceIndex {
    pub fn new() -> Self {
        Self {
            inner: AHashMap::new(),
        }
    }

    pub fn insert(&mut self, from: &str, to: &str, edge_id: &str) {
        self.inner
            .entry(from.to_string())
            .or_default()
            .insert(edge_id.to_string());
        self.inner
            .entry(to.to_string())
            .or_default()
            .insert(edge_id.to_string());
    }

    pub fn remove(&mut self, from: &str, to: &str, edge_id: &str) {
        for node in [from, to] {
            if let Some(set) = self.inner.get_mut(node) {
                set.remove(edge_id);
                if set.is_empty() {
                    self.inner.remove(node);
                }
            }
        }
    }

    pub fn edges_of(&self, node: &str) -> impl Iterator<Item = &str> {
        self.inner
            .get(node)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            nodes: self.inner.len(),
            entries: self.inner.values().map(BTreeSet::len).sum(),
        }
    }
}
