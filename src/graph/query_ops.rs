//! Query execution for GraphDb.

use ahash::AHashSet;

use crate::{
    errors::GraphDbError,
    hub::Subscription,
    query::{MapOptions, Query, flat_match, traverse},
};

use super::{GraphDb, GraphInner, types::NodeRecord};

#[derive(Debug)]
pub struct MapResult {
    pub nodes: Vec<NodeRecord>,
    pub subscription: Option<Subscription>,
}

impl GraphDb {
    pub fn map(&self, query: &Query) -> Result<Vec<NodeRecord>, GraphDbError> {
        Ok(self.map_with(query, MapOptions::new())?.nodes)
    }

    /// Runs `query` once and, when `options` carries a callback, keeps it live:
    /// the callback then receives the full result set after every change.
    ///
    /// Traversal depth comes from `options`, then the query, then the configured
    /// default, and must lie in `1..=max_depth_limit`.
    pub fn map_with(&self, query: &Query, options: MapOptions) -> Result<MapResult, GraphDbError> {
        let depth = self.resolve_depth(query, options.max_depth)?;
        let nodes = self.inner.run_query(query, depth);
        let subscription = options
            .callback
            .map(|callback| self.inner.hub.subscribe_query(query.clone(), depth, callback));
        Ok(MapResult {
            nodes,
            subscription,
        })
    }

    /// Like [`GraphDb::map`], keeping only the first occurrence of each node id.
    pub fn map_distinct(&self, query: &Query) -> Result<Vec<NodeRecord>, GraphDbError> {
        let mut seen = AHashSet::new();
        Ok(self
            .map(query)?
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .collect())
    }

    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.inner.hub.unsubscribe(subscription)
    }

    fn resolve_depth(&self, query: &Query, requested: Option<u32>) -> Result<u32, GraphDbError> {
        let from_query = match query {
            Query::Traverse { max_depth, .. } => *max_depth,
            Query::Match(_) => None,
        };
        let config = &self.inner.config;
        config.check_depth(
            requested
                .or(from_query)
                .unwrap_or(config.default_max_depth),
        )
    }
}

impl GraphInner {
    pub(crate) fn run_query(&self, query: &Query, depth: u32) -> Vec<NodeRecord> {
        let state = self.state.read();
        match query {
            Query::Match(filter) => flat_match(&state, filter),
            Query::Traverse { start, edge, .. } => traverse(&state, start, edge, depth),
        }
    }
}
