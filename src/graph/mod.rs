mod core;
mod edge_ops;
mod node_ops;
mod query_ops;
mod state;
mod stats;
mod types;

pub use self::core::GraphDb;
pub(crate) use self::core::GraphInner;
pub use node_ops::{GetOptions, GetResult};
pub use query_ops::MapResult;
pub use state::{GraphState, tombstone};
pub use stats::GraphStats;
pub use types::{
    EdgeRecord, NodeRecord, Revision, edge_id, now_millis, validate_edge, validate_node_id,
};
