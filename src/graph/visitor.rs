//! Graph traversal.
//!
//! Nodes and pads are [`Visitable`]: each knows what it depends on. Two
//! traversals walk the dependencies from a root:
//!
//! - [`bfs_traverse`] visits the root first and a dependency only once every
//!   dependent reachable from the root has been visited. Requirements
//!   flowing upstream are complete when a node is reached.
//! - [`dfs_traverse`] visits in post-order: every dependency before its
//!   dependents, the root last.
//!
//! Both visit each reachable visitable exactly once and keep their own
//! bookkeeping, so any number of traversals may run over a shared graph.

use crate::core::error::{ExecutionError, ExecutionResult, NodeId};
use crate::graph::connection::Endpoint;
use crate::graph::structure::ProcessingGraph;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

/// Callbacks run by a traversal.
pub trait Visitor {
    /// Called for each visited node.
    fn visit_node(&mut self, _graph: &ProcessingGraph, _node: NodeId) -> ExecutionResult<()> {
        Ok(())
    }

    /// Called for each visited pad.
    fn visit_pad(&mut self, _graph: &ProcessingGraph, _pad: &Endpoint) -> ExecutionResult<()> {
        Ok(())
    }
}

/// Something a traversal can walk through.
pub trait Visitable: Clone + Eq + Hash + fmt::Debug {
    /// The visitables this one reads from.
    fn depends_on(&self, graph: &ProcessingGraph) -> Vec<Self>;

    /// Dispatch to the matching visitor hook.
    fn accept<V: Visitor + ?Sized>(&self, graph: &ProcessingGraph, visitor: &mut V) -> ExecutionResult<()>;

    /// Node to blame when traversal fails here.
    fn owner(&self) -> NodeId;
}

impl Visitable for NodeId {
    /// Distinct source nodes of the node's input connections. A graph node
    /// depends on the nodes behind its output proxies.
    fn depends_on(&self, graph: &ProcessingGraph) -> Vec<NodeId> {
        let Ok(node) = graph.get_node(*self) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        if node.is_graph() {
            for pad in node.output_pads() {
                if let Ok(leaf) = graph.resolve(&Endpoint::new(*self, pad.name())) {
                    if !result.contains(&leaf.node_id) {
                        result.push(leaf.node_id);
                    }
                }
            }
            return result;
        }
        for pad in node.input_pads() {
            let input = Endpoint::new(*self, pad.name());
            if let Some(conn) = graph.incoming(&input) {
                if !result.contains(&conn.from.node_id) {
                    result.push(conn.from.node_id);
                }
            }
        }
        result
    }

    fn accept<V: Visitor + ?Sized>(&self, graph: &ProcessingGraph, visitor: &mut V) -> ExecutionResult<()> {
        visitor.visit_node(graph, *self)
    }

    fn owner(&self) -> NodeId {
        *self
    }
}

impl Visitable for Endpoint {
    /// An input pad depends on the pad feeding it, an output pad on every
    /// input pad of its node. A proxy depends on the pad it stands for.
    fn depends_on(&self, graph: &ProcessingGraph) -> Vec<Endpoint> {
        let Ok(pad) = graph.pad(self) else {
            return Vec::new();
        };
        if let Some(target) = pad.proxy_for() {
            return vec![target.clone()];
        }
        if pad.is_input() {
            return graph
                .incoming(self)
                .map(|c| c.from.clone())
                .into_iter()
                .collect();
        }
        match graph.get_node(self.node_id) {
            Ok(node) => node
                .input_pads()
                .map(|p| Endpoint::new(self.node_id, p.name()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn accept<V: Visitor + ?Sized>(&self, graph: &ProcessingGraph, visitor: &mut V) -> ExecutionResult<()> {
        visitor.visit_pad(graph, self)
    }

    fn owner(&self) -> NodeId {
        self.node_id
    }
}

// ============================================================================
// Traversals
// ============================================================================

/// Every visitable reachable from `root`, each with the number of distinct
/// reachable visitables that depend on it.
fn discover<T: Visitable>(graph: &ProcessingGraph, root: &T) -> (Vec<T>, HashMap<T, usize>) {
    let mut order = vec![root.clone()];
    let mut dependents: HashMap<T, usize> = HashMap::new();
    dependents.insert(root.clone(), 0);
    let mut queue = VecDeque::from([root.clone()]);

    while let Some(current) = queue.pop_front() {
        let mut seen = HashSet::new();
        for dep in current.depends_on(graph) {
            if !seen.insert(dep.clone()) {
                continue;
            }
            match dependents.get_mut(&dep) {
                Some(count) => *count += 1,
                None => {
                    dependents.insert(dep.clone(), 1);
                    order.push(dep.clone());
                    queue.push_back(dep);
                }
            }
        }
    }

    (order, dependents)
}

/// Breadth-first traversal from `root` towards its dependencies.
///
/// A visitable is visited only once all of its dependents reachable from the
/// root have been. Reachable visitables that can never be released lie on a
/// cycle, which is reported against the first of them.
pub fn bfs_traverse<T, V>(graph: &ProcessingGraph, root: &T, visitor: &mut V) -> ExecutionResult<()>
where
    T: Visitable,
    V: Visitor + ?Sized,
{
    let (order, mut pending) = discover(graph, root);
    let mut queue = VecDeque::new();
    let mut visited = 0usize;

    // The root can only have pending dependents if it sits on a cycle
    if pending.get(root).copied().unwrap_or(0) == 0 {
        queue.push_back(root.clone());
    }

    while let Some(current) = queue.pop_front() {
        log::trace!("bfs visit {:?}", current);
        current.accept(graph, visitor)?;
        visited += 1;

        let mut seen = HashSet::new();
        for dep in current.depends_on(graph) {
            if !seen.insert(dep.clone()) {
                continue;
            }
            if let Some(count) = pending.get_mut(&dep) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dep);
                }
            }
        }
    }

    if visited < order.len() {
        let stuck = order
            .iter()
            .find(|v| pending.get(*v).copied().unwrap_or(0) > 0)
            .unwrap_or(root);
        return Err(ExecutionError::CycleDetected {
            node_id: stuck.owner(),
        });
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Depth-first post-order traversal from `root`.
///
/// Dependencies are visited in the order `depends_on` lists them.
pub fn dfs_traverse<T, V>(graph: &ProcessingGraph, root: &T, visitor: &mut V) -> ExecutionResult<()>
where
    T: Visitable,
    V: Visitor + ?Sized,
{
    let mut marks: HashMap<T, Mark> = HashMap::new();
    let mut stack: Vec<(T, bool)> = vec![(root.clone(), false)];

    while let Some((current, expanded)) = stack.pop() {
        if expanded {
            marks.insert(current.clone(), Mark::Done);
            log::trace!("dfs visit {:?}", current);
            current.accept(graph, visitor)?;
            continue;
        }

        match marks.get(&current) {
            Some(Mark::Done) => continue,
            Some(Mark::InProgress) => {
                return Err(ExecutionError::CycleDetected {
                    node_id: current.owner(),
                });
            }
            None => {}
        }

        marks.insert(current.clone(), Mark::InProgress);
        stack.push((current.clone(), true));
        // Reversed so the first dependency is visited first
        for dep in current.depends_on(graph).into_iter().rev() {
            match marks.get(&dep) {
                Some(Mark::Done) => {}
                Some(Mark::InProgress) => {
                    return Err(ExecutionError::CycleDetected { node_id: dep.owner() });
                }
                None => stack.push((dep, false)),
            }
        }
    }

    Ok(())
}

// ============================================================================
// Collecting visitor
// ============================================================================

/// One recorded visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visit {
    Node(NodeId),
    Pad(Endpoint),
}

/// A visitor that records what it is shown, in order.
#[derive(Debug, Default)]
pub struct ListVisitor {
    pub visits: Vec<Visit>,
}

impl ListVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visited node handles, in visit order.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.visits
            .iter()
            .filter_map(|v| match v {
                Visit::Node(id) => Some(*id),
                Visit::Pad(_) => None,
            })
            .collect()
    }

    /// Visited pads, in visit order.
    pub fn pads(&self) -> Vec<Endpoint> {
        self.visits
            .iter()
            .filter_map(|v| match v {
                Visit::Pad(p) => Some(p.clone()),
                Visit::Node(_) => None,
            })
            .collect()
    }
}

impl Visitor for ListVisitor {
    fn visit_node(&mut self, _graph: &ProcessingGraph, node: NodeId) -> ExecutionResult<()> {
        self.visits.push(Visit::Node(node));
        Ok(())
    }

    fn visit_pad(&mut self, _graph: &ProcessingGraph, pad: &Endpoint) -> ExecutionResult<()> {
        self.visits.push(Visit::Pad(pad.clone()));
        Ok(())
    }
}

/// Nodes reachable upstream of `root` in post-order.
pub fn post_order(graph: &ProcessingGraph, root: NodeId) -> ExecutionResult<Vec<NodeId>> {
    let mut list = ListVisitor::new();
    dfs_traverse(graph, &root, &mut list)?;
    Ok(list.nodes())
}

/// Nodes reachable upstream of `root` in breadth-first request order.
pub fn request_order(graph: &ProcessingGraph, root: NodeId) -> ExecutionResult<Vec<NodeId>> {
    let mut list = ListVisitor::new();
    bfs_traverse(graph, &root, &mut list)?;
    Ok(list.nodes())
}
