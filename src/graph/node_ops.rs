//! Node operations for GraphDb.

use std::{fmt, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    errors::GraphDbError,
    hub::{NodeCallback, Subscription},
    oplog::Operation,
};

use super::{
    GraphDb,
    types::{NodeRecord, now_millis, validate_node_id},
};

/// Options for [`GraphDb::get_with`].
#[derive(Clone, Default)]
pub struct GetOptions {
    pub callback: Option<NodeCallback>,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` to receive every later revision of the node, and `None`
    /// once it is removed.
    pub fn subscribe<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<&NodeRecord>) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for GetOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetOptions")
            .field("subscribe", &self.callback.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct GetResult {
    pub node: Option<NodeRecord>,
    pub subscription: Option<Subscription>,
}

impl GraphDb {
    pub fn put(&self, id: &str, data: Value) -> Result<NodeRecord, GraphDbError> {
        self.put_with(id, data, Map::new())
    }

    /// Writes `data` under `id`, stamping a fresh timestamp and the next version.
    /// The stamp always outranks the record it replaces, even one merged from a
    /// peer whose clock runs ahead. `meta` fields are stored alongside the record.
    pub fn put_with(
        &self,
        id: &str,
        data: Value,
        meta: Map<String, Value>,
    ) -> Result<NodeRecord, GraphDbError> {
        validate_node_id(id)?;
        let (record, op) = {
            let mut state = self.inner.state.write();
            let record = state.put_node(id, data, meta, now_millis());
            let op = Operation::Put {
                node: record.clone(),
            };
            state.oplog_mut().append(op.clone());
            (record, op)
        };
        self.inner
            .after_change(Some(&op), vec![(record.id.clone(), Some(record.clone()))]);
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Option<NodeRecord> {
        self.inner.state.read().node(id).cloned()
    }

    /// Point lookup that can also subscribe to the node. The subscription is in
    /// place before the snapshot is read, so no change is missed in between.
    pub fn get_with(&self, id: &str, options: GetOptions) -> GetResult {
        let subscription = options
            .callback
            .map(|callback| self.inner.hub.subscribe_node(id, callback));
        GetResult {
            node: self.get(id),
            subscription,
        }
    }

    /// Deletes the node and every edge touching it. Returns `false` when the node
    /// did not exist; nothing is logged or broadcast in that case.
    pub fn remove(&self, id: &str) -> bool {
        let op = {
            let mut state = self.inner.state.write();
            let Some((timestamp, _)) = state.remove_node(id, now_millis()) else {
                return false;
            };
            let op = Operation::Remove {
                id: id.to_string(),
                timestamp,
            };
            state.oplog_mut().append(op.clone());
            op
        };
        self.inner.after_change(Some(&op), vec![(id.to_string(), None)]);
        true
    }

    /// Empties nodes, edges and the oplog. The oplog afterwards holds only the
    /// clear itself, so peers replaying it converge on the empty graph.
    pub fn clear(&self) {
        let (removed, op) = {
            let mut state = self.inner.state.write();
            let (timestamp, removed) = state.clear(now_millis());
            let op = Operation::Clear { timestamp };
            state.oplog_mut().append(op.clone());
            (removed, op)
        };
        self.inner.after_change(
            Some(&op),
            removed.into_iter().map(|id| (id, None)).collect(),
        );
    }
}
