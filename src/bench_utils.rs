//! Deterministic synthetic graphs for benches and load tests.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::{Value, json};

use crate::{
    errors::GraphDbError,
    graph::{EdgeRecord, GraphDb, NodeRecord, edge_id},
    oplog::Operation,
};

/// Node kinds assigned to generated nodes, stored under `data.type`.
pub const NODE_KINDS: [&str; 3] = ["user", "friend", "group"];

#[derive(Clone, Debug)]
pub struct GraphDataset {
    pub nodes: Vec<(String, Value)>,
    pub edges: Vec<(usize, usize)>,
}

impl GraphDataset {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_id(&self, idx: usize) -> &str {
        &self.nodes[idx].0
    }

    /// Index of the node with the most incident edges.
    pub fn hub_index(&self) -> usize {
        let mut degrees = vec![0usize; self.nodes.len()];
        for &(from, to) in &self.edges {
            degrees[from] += 1;
            degrees[to] += 1;
        }
        degrees
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(&a.0)))
            .map_or(0, |(idx, _)| idx)
    }

    /// Writes every node, then every edge, through the public mutation API.
    pub fn load_into(&self, db: &GraphDb) -> Result<(), GraphDbError> {
        for (id, data) in &self.nodes {
            db.put(id, data.clone())?;
        }
        for &(from, to) in &self.edges {
            db.link(self.node_id(from), self.node_id(to), json!({ "rel": "knows" }))?;
        }
        Ok(())
    }

    /// The dataset as a peer batch, stamped with increasing timestamps from `base`.
    pub fn as_operations(&self, base: u64) -> Vec<Operation> {
        let mut ops = Vec::with_capacity(self.nodes.len() + self.edges.len());
        let mut clock = base;
        for (id, data) in &self.nodes {
            clock += 1;
            ops.push(Operation::Put {
                node: NodeRecord {
                    id: id.clone(),
                    data: data.clone(),
                    timestamp: clock,
                    version: 1,
                    meta: Default::default(),
                },
            });
        }
        for &(from, to) in &self.edges {
            clock += 1;
            let (from, to) = (self.node_id(from), self.node_id(to));
            ops.push(Operation::Link {
                edge: EdgeRecord {
                    id: edge_id(from, to),
                    from: from.to_string(),
                    to: to.to_string(),
                    data: json!({ "rel": "knows" }),
                    timestamp: clock,
                },
            });
        }
        ops
    }
}

#[derive(Clone, Debug)]
pub enum GraphShape {
    Line,
    Star,
    Random { edges: usize },
    ScaleFree { m: usize },
}

pub fn generate_graph(shape: GraphShape, node_count: usize, seed: u64) -> GraphDataset {
    assert!(node_count > 1, "node_count must exceed 1");
    let mut rng = StdRng::seed_from_u64(seed);
    let nodes = (0..node_count)
        .map(|idx| {
            let kind = NODE_KINDS[rng.gen_range(0..NODE_KINDS.len())];
            (format!("n{idx}"), json!({ "type": kind, "idx": idx }))
        })
        .collect();
    let mut edges = match shape {
        GraphShape::Line => (0..node_count - 1).map(|i| (i, i + 1)).collect(),
        GraphShape::Star => (1..node_count).map(|leaf| (0, leaf)).collect(),
        GraphShape::Random { edges } => random_edges(&mut rng, node_count, edges),
        GraphShape::ScaleFree { m } => scale_free_edges(&mut rng, node_count, m),
    };
    edges.sort_unstable();
    edges.dedup();
    GraphDataset { nodes, edges }
}

fn random_edges(rng: &mut StdRng, node_count: usize, edge_count: usize) -> Vec<(usize, usize)> {
    (0..edge_count)
        .filter_map(|_| {
            let from = rng.gen_range(0..node_count);
            let to = rng.gen_range(0..node_count);
            (from != to).then_some((from, to))
        })
        .collect()
}

/// Preferential attachment: each new node links to `m` endpoints drawn from the list
/// of all edge endpoints so far, so well-connected nodes attract more edges.
fn scale_free_edges(rng: &mut StdRng, node_count: usize, m: usize) -> Vec<(usize, usize)> {
    assert!(m > 0, "m must be positive");
    assert!(node_count > m + 1, "node_count must exceed m + 1");
    let mut edges = Vec::with_capacity(node_count * m);
    let mut endpoints = Vec::with_capacity(node_count * m * 2);
    for u in 0..=m {
        for v in (u + 1)..=m {
            edges.push((u, v));
            endpoints.extend([u, v]);
        }
    }
    for new_node in (m + 1)..node_count {
        let mut targets: Vec<usize> = Vec::with_capacity(m);
        while targets.len() < m {
            let pick = endpoints[rng.gen_range(0..endpoints.len())];
            if !targets.contains(&pick) {
                targets.push(pick);
            }
        }
        for target in targets {
            edges.push((target, new_node));
            endpoints.extend([target, new_node]);
        }
    }
    edges
}
