//! Edge operations for GraphDb.

use serde_json::Value;

use crate::{errors::GraphDbError, oplog::Operation};

use super::{
    GraphDb,
    types::{EdgeRecord, now_millis, validate_node_id},
};

impl GraphDb {
    /// Creates the edge `from -> to`, replacing any earlier edge between the same
    /// ordered pair. Endpoints do not need to exist.
    pub fn link(&self, from: &str, to: &str, data: Value) -> Result<EdgeRecord, GraphDbError> {
        validate_node_id(from)?;
        validate_node_id(to)?;
        let (edge, op) = {
            let mut state = self.inner.state.write();
            let edge = state.link(from, to, data, now_millis());
            let op = Operation::Link { edge: edge.clone() };
            state.oplog_mut().append(op.clone());
            (edge, op)
        };
        self.inner.after_change(Some(&op), Vec::new());
        Ok(edge)
    }

    pub fn get_edge(&self, id: &str) -> Option<EdgeRecord> {
        self.inner.state.read().edge(id).cloned()
    }

    /// Edges with `node_id` at either end, ordered by edge id.
    pub fn edges_of(&self, node_id: &str) -> Vec<EdgeRecord> {
        self.inner
            .state
            .read()
            .incident_edges(node_id)
            .cloned()
            .collect()
    }
}
