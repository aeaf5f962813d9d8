//! Bounded operation log.
//!
//! Every mutation appends one [`Operation`]. The log keeps only the most recent
//! `window` entries: it feeds persistence and peer replay, it is not a history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    errors::GraphDbError,
    graph::{EdgeRecord, NodeRecord, validate_edge, validate_node_id},
};

pub const DEFAULT_OPLOG_WINDOW: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Put { node: NodeRecord },
    Link { edge: EdgeRecord },
    Remove { id: String, timestamp: u64 },
    Clear { timestamp: u64 },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Put { .. } => "put",
            Operation::Link { .. } => "link",
            Operation::Remove { .. } => "remove",
            Operation::Clear { .. } => "clear",
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Operation::Put { node } => node.timestamp,
            Operation::Link { edge } => edge.timestamp,
            Operation::Remove { timestamp, .. } | Operation::Clear { timestamp } => *timestamp,
        }
    }

    /// Rejects payloads a peer could not have produced through the public API.
    pub fn validate(&self) -> Result<(), GraphDbError> {
        match self {
            Operation::Put { node } => {
                validate_node_id(&node.id)?;
                if node.version == 0 {
                    return Err(GraphDbError::invalid_input(format!(
                        "node {} carries version 0",
                        node.id
                    )));
                }
                Ok(())
            }
            Operation::Link { edge } => validate_edge(edge),
            Operation::Remove { id, .. } => validate_node_id(id),
            Operation::Clear { .. } => Ok(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Oplog {
    entries: VecDeque<Operation>,
    window: usize,
}

impl Oplog {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            entries: VecDeque::with_capacity(window.min(1024)),
            window,
        }
    }

    /// Rebuilds a log from persisted entries, keeping the most recent `window`.
    pub fn from_entries(entries: Vec<Operation>, window: usize) -> Self {
        let mut log = Self::new(window);
        for op in entries {
            log.append(op);
        }
        log
    }

    /// Appends `op`, evicting the oldest entry once the window is exceeded.
    pub fn append(&mut self, op: Operation) {
        self.entries.push_back(op);
        while self.entries.len() > self.window {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Operation> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for Oplog {
    fn default() -> Self {
        Self::new(DEFAULT_OPLOG_WINDOW)
    }
}
