//! Query model: flat equality filters and `$edge` traversals.
//!
//! A query either matches nodes directly ([`Query::Match`]) or starts from the nodes
//! matching one filter and walks edges in both directions collecting the nodes that
//! match a second filter ([`Query::Traverse`]). The JSON form mirrors the dynamic
//! object syntax: keys prefixed with `$` are operators, never data fields.

mod traversal;

pub use traversal::{flat_match, traverse};

use serde_json::{Map, Value};

use crate::{errors::GraphDbError, graph::NodeRecord, hub::QueryCallback};

/// Operator key selecting a traversal in the JSON form.
pub const EDGE_OPERATOR: &str = "$edge";
/// Option key carrying the traversal depth in [`MapOptions::from_json`].
pub const MAX_DEPTH_OPTION: &str = "maxDepth";

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Equals { field: String, value: Value },
}

impl Predicate {
    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Predicate::Equals { field, value } => data
                .as_object()
                .and_then(|obj| obj.get(field))
                .is_some_and(|found| found == value),
        }
    }
}

/// Conjunction of predicates over `node.data`. The empty filter matches every node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq<K: Into<String>, V: Into<Value>>(mut self, field: K, value: V) -> Self {
        self.predicates.push(Predicate::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn matches(&self, node: &NodeRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(&node.data))
    }

    /// Builds a filter from a JSON object, skipping `$`-prefixed operator keys.
    /// `null` is the empty filter; any other non-object is rejected.
    pub fn from_json(value: &Value) -> Result<Self, GraphDbError> {
        match value {
            Value::Null => Ok(Self::all()),
            Value::Object(map) => Ok(Self::from_object(map)),
            other => Err(GraphDbError::invalid_query(format!(
                "filter must be an object, got {}",
                json_kind(other)
            ))),
        }
    }

    fn from_object(map: &Map<String, Value>) -> Self {
        let mut filter = Self::all();
        let mut keys: Vec<&String> = map.keys().filter(|k| !k.starts_with('$')).collect();
        keys.sort();
        for key in keys {
            filter = filter.eq(key.as_str(), map[key.as_str()].clone());
        }
        filter
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    Match(Filter),
    Traverse {
        start: Filter,
        edge: Filter,
        max_depth: Option<u32>,
    },
}

impl Query {
    pub fn all() -> Self {
        Query::Match(Filter::all())
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// Parses the dynamic object form, e.g.
    /// `{"$edge": {"type": "friend"}, "type": "user", "name": "Ann"}`.
    pub fn from_json(value: &Value) -> Result<Self, GraphDbError> {
        let map = match value {
            Value::Null => return Ok(Self::all()),
            Value::Object(map) => map,
            other => {
                return Err(GraphDbError::invalid_query(format!(
                    "query must be an object, got {}",
                    json_kind(other)
                )));
            }
        };
        let start = Filter::from_object(map);
        match map.get(EDGE_OPERATOR) {
            None => Ok(Query::Match(start)),
            Some(edge) => Ok(Query::Traverse {
                start,
                edge: Filter::from_json(edge)?,
                max_depth: None,
            }),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    start: Filter,
    edge: Option<Filter>,
    max_depth: Option<u32>,
}

impl QueryBuilder {
    pub fn eq<K: Into<String>, V: Into<Value>>(mut self, field: K, value: V) -> Self {
        self.start = self.start.eq(field, value);
        self
    }

    /// Turns the query into a traversal collecting nodes that match `filter`.
    pub fn edge(mut self, filter: Filter) -> Self {
        self.edge = Some(filter);
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn build(self) -> Query {
        match self.edge {
            None => Query::Match(self.start),
            Some(edge) => Query::Traverse {
                start: self.start,
                edge,
                max_depth: self.max_depth,
            },
        }
    }
}

/// Options for `map`: a traversal depth override and an optional live callback.
#[derive(Clone, Default)]
pub struct MapOptions {
    pub max_depth: Option<u32>,
    pub callback: Option<QueryCallback>,
}

impl MapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Registers `callback` to receive the full result set after every change.
    pub fn subscribe<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[NodeRecord]) + Send + Sync + 'static,
    {
        self.callback = Some(std::sync::Arc::new(callback));
        self
    }

    /// Reads `maxDepth` from a JSON options object. The value must be a non-negative
    /// integer; range checks happen when the query runs.
    pub fn from_json(value: &Value) -> Result<Self, GraphDbError> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(GraphDbError::invalid_query(format!(
                    "options must be an object, got {}",
                    json_kind(other)
                )));
            }
        };
        let max_depth = match map.get(MAX_DEPTH_OPTION) {
            None | Some(Value::Null) => None,
            Some(raw) => Some(
                raw.as_u64()
                    .and_then(|d| u32::try_from(d).ok())
                    .ok_or_else(|| {
                        GraphDbError::invalid_query(format!("maxDepth must be an integer, got {raw}"))
                    })?,
            ),
        };
        Ok(Self {
            max_depth,
            callback: None,
        })
    }
}

impl std::fmt::Debug for MapOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapOptions")
            .field("max_depth", &self.max_depth)
            .field("subscribe", &self.callback.is_some())
            .finish()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(data: Value) -> NodeRecord {
        NodeRecord {
            id: "n".into(),
            data,
            timestamp: 0,
            version: 1,
            meta: Map::new(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::all().matches(&node(json!(null))));
        assert!(Filter::all().matches(&node(json!({ "a": 1 }))));
    }

    #[test]
    fn test_equality_is_strict() {
        let filter = Filter::all().eq("age", 30);
        assert!(filter.matches(&node(json!({ "age": 30 }))));
        assert!(!filter.matches(&node(json!({ "age": "30" }))));
        assert!(!filter.matches(&node(json!({}))));
        assert!(!filter.matches(&node(json!([30]))));
    }

    #[test]
    fn test_from_json_skips_operator_keys() {
        let query = Query::from_json(&json!({ "$limit": 5, "type": "user" })).unwrap();
        assert_eq!(query, Query::Match(Filter::all().eq("type", "user")));
    }

    #[test]
    fn test_from_json_detects_edge_operator() {
        let query =
            Query::from_json(&json!({ "$edge": { "type": "friend" }, "name": "Ann" })).unwrap();
        assert_eq!(
            query,
            Query::Traverse {
                start: Filter::all().eq("name", "Ann"),
                edge: Filter::all().eq("type", "friend"),
                max_depth: None,
            }
        );
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(Query::from_json(&json!("type=user")).is_err());
        assert!(Query::from_json(&json!({ "$edge": 3 })).is_err());
        assert_eq!(Query::from_json(&Value::Null).unwrap(), Query::all());
    }

    #[test]
    fn test_builder_matches_json_form() {
        let built = Query::builder()
            .eq("name", "Ann")
            .eq("type", "user")
            .edge(Filter::all().eq("type", "friend"))
            .build();
        let parsed = Query::from_json(
            &json!({ "type": "user", "name": "Ann", "$edge": { "type": "friend" } }),
        )
        .unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn test_options_reject_non_numeric_depth() {
        assert!(MapOptions::from_json(&json!({ "maxDepth": "deep" })).is_err());
        assert!(MapOptions::from_json(&json!({ "maxDepth": -1 })).is_err());
        assert!(MapOptions::from_json(&json!({ "maxDepth": 1.5 })).is_err());
        let opts = MapOptions::from_json(&json!({ "maxDepth": 3, "subscribe": true })).unwrap();
        assert_eq!(opts.max_depth, Some(3));
    }
}
