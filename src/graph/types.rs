use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::GraphDbError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: String,
    pub data: Value,
    pub timestamp: u64,
    pub version: u64,
    /// Extra fields merged onto the record by `put_with`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl NodeRecord {
    pub fn revision(&self) -> Revision {
        Revision {
            timestamp: self.timestamp,
            version: self.version,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub data: Value,
    pub timestamp: u64,
}

impl EdgeRecord {
    pub fn revision(&self) -> Revision {
        Revision {
            timestamp: self.timestamp,
            version: 0,
        }
    }

    /// Returns the endpoint opposite `node`, or `None` if the edge does not touch it.
    pub fn other_end(&self, node: &str) -> Option<&str> {
        if self.from == node {
            Some(self.to.as_str())
        } else if self.to == node {
            Some(self.from.as_str())
        } else {
            None
        }
    }
}

/// Ordering key used when two replicas disagree about a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision {
    pub timestamp: u64,
    pub version: u64,
}

/// Derives the edge id for the ordered pair `(from, to)`. The length prefix keeps the
/// mapping injective even when ids contain the `->` separator.
pub fn edge_id(from: &str, to: &str) -> String {
    format!("{}:{from}->{to}", from.len())
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn validate_node_id(id: &str) -> Result<(), GraphDbError> {
    if id.trim().is_empty() {
        return Err(GraphDbError::invalid_input("node id must be set"));
    }
    Ok(())
}

pub fn validate_edge(edge: &EdgeRecord) -> Result<(), GraphDbError> {
    validate_node_id(&edge.from)?;
    validate_node_id(&edge.to)?;
    if edge.id != edge_id(&edge.from, &edge.to) {
        return Err(GraphDbError::invalid_input(format!(
            "edge id {} is not derived from its endpoints",
            edge.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_id_is_unambiguous() {
        assert_ne!(edge_id("a->b", "c"), edge_id("a", "b->c"));
        assert_eq!(edge_id("n1", "n2"), edge_id("n1", "n2"));
        assert_ne!(edge_id("n1", "n2"), edge_id("n2", "n1"));
    }

    #[test]
    fn test_other_end() {
        let edge = EdgeRecord {
            id: edge_id("a", "b"),
            from: "a".into(),
            to: "b".into(),
            data: Value::Null,
            timestamp: 1,
        };
        assert_eq!(edge.other_end("a"), Some("b"));
        assert_eq!(edge.other_end("b"), Some("a"));
        assert_eq!(edge.other_end("c"), None);
    }

    #[test]
    fn test_validate_edge_rejects_foreign_id() {
        let edge = EdgeRecord {
            id: "bogus".into(),
            from: "a".into(),
            to: "b".into(),
            data: Value::Null,
            timestamp: 1,
        };
        assert!(matches!(
            validate_edge(&edge),
            Err(GraphDbError::InvalidInput(_))
        ));
    }
}
