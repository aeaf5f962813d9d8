use ahash::AHashSet;

use crate::graph::{GraphState, NodeRecord};

use super::Filter;

/// Nodes matching `filter`, ordered by id.
pub fn flat_match(state: &GraphState, filter: &Filter) -> Vec<NodeRecord> {
    let mut matched: Vec<&NodeRecord> = state.nodes().filter(|n| filter.matches(n)).collect();
    matched.sort_by(|a, b| a.id.cmp(&b.id));
    matched.into_iter().cloned().collect()
}

/// Depth-first walk from every node matching `start`, collecting visited nodes that
/// match `edge`.
///
/// Edges are followed in both directions. Each start node gets its own visited set,
/// so a node reachable from two start nodes is reported twice. A node is expanded
/// only while its depth is below `max_depth`; the start node sits at depth 0.
/// Endpoints without a stored node are neither reported nor expanded.
pub fn traverse(state: &GraphState, start: &Filter, edge: &Filter, max_depth: u32) -> Vec<NodeRecord> {
    let mut results = Vec::new();
    for root in flat_match(state, start) {
        walk(state, &root.id, edge, max_depth, &mut results);
    }
    results
}

fn walk(state: &GraphState, root: &str, edge: &Filter, max_depth: u32, out: &mut Vec<NodeRecord>) {
    let mut visited: AHashSet<String> = AHashSet::new();
    let mut stack: Vec<(String, u32)> = vec![(root.to_string(), 0)];
    while let Some((current, depth)) = stack.pop() {
        if visited.contains(&current) {
            continue;
        }
        let Some(node) = state.node(&current) else {
            continue;
        };
        visited.insert(current.clone());
        if edge.matches(node) {
            out.push(node.clone());
        }
        if depth >= max_depth {
            continue;
        }
        // Reverse so the first incident edge is expanded first, as a recursive walk would.
        let neighbours: Vec<String> = state
            .incident_edges(&current)
            .filter_map(|e| e.other_end(&current))
            .filter(|next| !visited.contains(*next))
            .map(str::to_string)
            .collect();
        for next in neighbours.into_iter().rev() {
            stack.push((next, depth + 1));
        }
    }
}
