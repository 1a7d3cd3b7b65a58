//! Topological analysis of the flattened graph.
//!
//! Nested graphs only hold proxies, so the flattened graph is the leaf nodes
//! plus the stored connections. Provides:
//! - Topological sorting and cycle checks (petgraph)
//! - Dependency depth and parallel batches
//! - A DOT dump for debugging

use crate::core::error::{ConnectionId, GraphError, GraphResult, NodeId};
use crate::graph::structure::ProcessingGraph;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// Analyzer for graph topology.
pub struct TopologyAnalyzer<'a> {
    graph: &'a ProcessingGraph,
    flat: DiGraph<NodeId, ConnectionId>,
    index: HashMap<NodeId, NodeIndex>,
}

impl<'a> TopologyAnalyzer<'a> {
    /// Create a new analyzer for the given graph.
    pub fn new(graph: &'a ProcessingGraph) -> Self {
        let mut flat = DiGraph::new();
        let mut index = HashMap::new();
        for node in graph.operation_nodes() {
            index.insert(node.id(), flat.add_node(node.id()));
        }
        for conn in graph.connections() {
            if let (Some(&from), Some(&to)) = (index.get(&conn.from.node_id), index.get(&conn.to.node_id)) {
                flat.add_edge(from, to, conn.id);
            }
        }
        Self { graph, flat, index }
    }

    /// Leaf nodes ordered so every source comes before its consumers.
    pub fn topological_sort(&self) -> GraphResult<Vec<NodeId>> {
        toposort(&self.flat, None)
            .map(|order| order.into_iter().map(|ix| self.flat[ix]).collect())
            .map_err(|cycle| {
                let node = self.flat[cycle.node_id()];
                GraphError::CycleDetected {
                    upstream: node,
                    downstream: node,
                }
            })
    }

    /// Check if the flattened graph has any cycles.
    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.flat)
    }

    /// Longest path from a source node, for every leaf node.
    pub fn depths(&self) -> GraphResult<HashMap<NodeId, usize>> {
        let order = self.topological_sort()?;
        Ok(depths_in_order(self.graph, &order))
    }

    /// Get the execution depth of a node.
    ///
    /// Depth 0 = source nodes (no dependencies)
    pub fn node_depth(&self, node_id: NodeId) -> GraphResult<usize> {
        if !self.index.contains_key(&node_id) {
            return Err(GraphError::NodeNotFound(node_id));
        }
        Ok(self.depths()?.get(&node_id).copied().unwrap_or(0))
    }

    /// Group leaf nodes into batches with no dependencies inside a batch.
    pub fn parallel_batches(&self) -> GraphResult<Vec<Vec<NodeId>>> {
        let order = self.topological_sort()?;
        Ok(batches_in_order(self.graph, &order))
    }

    /// Get the critical path length (longest path through the graph).
    pub fn critical_path_length(&self) -> GraphResult<usize> {
        Ok(self.parallel_batches()?.len())
    }

    /// Find all weakly connected groups of leaf nodes.
    pub fn find_subgraphs(&self) -> Vec<HashSet<NodeId>> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut subgraphs = Vec::new();

        for start in self.flat.node_indices() {
            if visited.contains(&start) {
                continue;
            }
            let mut group = HashSet::new();
            let mut stack = vec![start];
            while let Some(ix) = stack.pop() {
                if !visited.insert(ix) {
                    continue;
                }
                group.insert(self.flat[ix]);
                stack.extend(self.flat.neighbors_undirected(ix));
            }
            subgraphs.push(group);
        }

        subgraphs
    }

    /// DOT rendering of the flattened graph, with nested graphs as clusters.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph ambit {\n  rankdir=LR;\n  node [shape=box];\n");

        for node in self.graph.nodes().filter(|n| n.is_graph()) {
            if node.parent().is_some() {
                continue;
            }
            self.write_cluster(&mut out, node.id(), 1);
        }
        for node in self.graph.operation_nodes().filter(|n| n.parent().is_none()) {
            let _ = writeln!(out, "  {};", self.dot_node(node.id()));
        }
        for conn in self.graph.connections() {
            let _ = writeln!(
                out,
                "  {} -> {} [label=\"{}:{}\"];",
                conn.from.node_id.0, conn.to.node_id.0, conn.from.pad, conn.to.pad
            );
        }
        out.push_str("}\n");
        out
    }

    fn write_cluster(&self, out: &mut String, graph: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Ok(node) = self.graph.get_node(graph) else {
            return;
        };
        let _ = writeln!(out, "{}subgraph cluster_{} {{", indent, graph.0);
        let _ = writeln!(out, "{}  label=\"{}\";", indent, node.display_name());
        for &child in self.graph.children(graph).unwrap_or(&[]) {
            match self.graph.get_node(child) {
                Ok(c) if c.is_graph() => self.write_cluster(out, child, depth + 1),
                Ok(_) => {
                    let _ = writeln!(out, "{}  {};", indent, self.dot_node(child));
                }
                Err(_) => {}
            }
        }
        let _ = writeln!(out, "{}}}", indent);
    }

    fn dot_node(&self, id: NodeId) -> String {
        let name = self
            .graph
            .get_node(id)
            .map(|n| n.display_name())
            .unwrap_or_default();
        format!("{} [label=\"{} ({})\"]", id.0, name, id)
    }
}

/// Dependency depth of each node in `order`, which must list sources first.
///
/// Only connections between nodes in `order` count.
pub fn depths_in_order(graph: &ProcessingGraph, order: &[NodeId]) -> HashMap<NodeId, usize> {
    let mut depth: HashMap<NodeId, usize> = HashMap::new();
    for &node_id in order {
        let d = graph
            .connections_to(node_id)
            .filter_map(|conn| depth.get(&conn.from.node_id))
            .max()
            .map_or(0, |d| d + 1);
        depth.insert(node_id, d);
    }
    depth
}

/// Nodes of `order` grouped by dependency depth, keeping `order` within a
/// batch.
pub fn batches_in_order(graph: &ProcessingGraph, order: &[NodeId]) -> Vec<Vec<NodeId>> {
    let depth = depths_in_order(graph, order);
    let max_depth = depth.values().max().copied().unwrap_or(0);
    let mut batches: Vec<Vec<NodeId>> = vec![Vec::new(); max_depth + 1];
    for node_id in order {
        if let Some(&d) = depth.get(node_id) {
            batches[d].push(*node_id);
        }
    }
    batches.retain(|batch| !batch.is_empty());
    batches
}
