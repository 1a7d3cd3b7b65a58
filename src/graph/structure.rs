//! Graph structure and node management.
//!
//! The ProcessingGraph is the arena that owns every node and connection. It
//! is the only place the topology changes, so it is also where:
//! - Connections are checked (pads, directions, types, cycles)
//! - Proxy pads of nested graphs are resolved to leaf pads
//! - Cached regions are invalidated when the topology or a property changes

use crate::core::error::{ConnectionId, GraphError, GraphResult, NodeId};
use crate::core::node::Operation;
use crate::core::pad::PadDirection;
use crate::core::types::Value;
use crate::execution::cache::{new_shared_cache, SharedCache, DEFAULT_CAPACITY};
use crate::graph::connection::{Connection, Endpoint};
use crate::graph::node::{GraphNode, Pad};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// A graph shared between threads.
///
/// The write lock is the per-graph exclusive section: mutations take it,
/// requests hold the read lock for their whole traversal.
pub type SharedGraph = Arc<RwLock<ProcessingGraph>>;

/// The main processing graph structure.
///
/// Uses IndexMap to maintain insertion order for consistent iteration.
/// Node and connection handles come from counters and are never reused.
#[derive(Debug)]
pub struct ProcessingGraph {
    /// All nodes in the graph, indexed by ID.
    nodes: IndexMap<NodeId, GraphNode>,
    /// All connections, between leaf pads.
    connections: IndexMap<ConnectionId, Connection>,
    next_node: u64,
    next_connection: u64,
    cache: SharedCache,
    /// Optional name for this graph.
    pub name: Option<String>,
}

impl Default for ProcessingGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
            next_node: 1,
            next_connection: 1,
            cache: new_shared_cache(DEFAULT_CAPACITY),
            name: None,
        }
    }

    /// Set the graph name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Use an existing region cache.
    pub fn with_region_cache(mut self, cache: SharedCache) -> Self {
        self.cache = cache;
        self
    }

    /// Wrap the graph for use from several threads.
    pub fn into_shared(self) -> SharedGraph {
        Arc::new(RwLock::new(self))
    }

    /// The region cache attached to this graph.
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    // ========================================================================
    // Node Management
    // ========================================================================

    /// Add a node to the graph and assign its handle.
    pub fn add_node(&mut self, mut node: GraphNode) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        node.id = id;
        node.parent = None;
        log::debug!("Added node {} ({})", id, node.type_id());
        self.nodes.insert(id, node);
        id
    }

    /// Add a leaf node wrapping `operation`.
    pub fn add_operation(&mut self, operation: Box<dyn Operation>) -> NodeId {
        self.add_node(GraphNode::new(operation))
    }

    /// Add an empty nested graph node.
    pub fn add_graph(&mut self, name: impl Into<String>) -> NodeId {
        self.add_node(GraphNode::graph(name))
    }

    /// Remove a node from the graph.
    ///
    /// Severs every connection on the node first. A graph node takes its
    /// children with it.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<GraphNode> {
        let node = self.get_node(id)?;
        let children = node
            .graph_operation()
            .map(|g| g.children().to_vec())
            .unwrap_or_default();
        let parent = node.parent;

        for child in children {
            self.remove_node(child)?;
        }

        let attached: Vec<ConnectionId> = self
            .get_node(id)?
            .pads()
            .flat_map(|p| p.connections().iter().copied())
            .collect();
        for connection in attached {
            self.remove_connection(connection)?;
        }

        if let Some(parent) = parent {
            self.unparent(parent, id);
        }

        self.cache.invalidate_node(id);
        log::debug!("Removed node {}", id);
        self.nodes
            .shift_remove(&id)
            .ok_or(GraphError::NodeNotFound(id))
    }

    /// Get a reference to a node.
    pub fn get_node(&self, id: NodeId) -> GraphResult<&GraphNode> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, id: NodeId) -> GraphResult<&mut GraphNode> {
        self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))
    }

    /// Check if a node exists.
    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Leaf nodes only; these form the flattened graph.
    pub fn operation_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values().filter(|n| !n.is_graph())
    }

    /// Get all node IDs.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Enable or disable region caching for a node.
    pub fn set_cache(&mut self, id: NodeId, enabled: bool) -> GraphResult<()> {
        let node = self.get_node_mut(id)?;
        node.cache = enabled;
        if !enabled {
            self.cache.invalidate_node(id);
        }
        Ok(())
    }

    // ========================================================================
    // Pads
    // ========================================================================

    /// Look up a pad without resolving proxies.
    pub fn pad(&self, endpoint: &Endpoint) -> GraphResult<&Pad> {
        self.get_node(endpoint.node_id)?
            .get_pad(&endpoint.pad)
            .ok_or_else(|| GraphError::UnknownPad {
                node_id: endpoint.node_id,
                pad: endpoint.pad.clone(),
            })
    }

    /// Follow proxy pads down to the leaf pad they stand for.
    pub fn resolve(&self, endpoint: &Endpoint) -> GraphResult<Endpoint> {
        let mut current = endpoint.clone();
        // Nesting is acyclic, so the chain is at most as long as the node count.
        for _ in 0..=self.nodes.len() {
            let pad = self.pad(&current)?;
            match pad.proxy_for() {
                None => return Ok(current),
                Some(target) => {
                    if self.pad(target).is_err() {
                        return Err(GraphError::DanglingProxy {
                            node_id: current.node_id,
                            pad: current.pad.clone(),
                        });
                    }
                    current = target.clone();
                }
            }
        }
        Err(GraphError::DanglingProxy {
            node_id: endpoint.node_id,
            pad: endpoint.pad.clone(),
        })
    }

    fn resolve_pad(
        &self,
        node_id: NodeId,
        pad: &str,
        expected: PadDirection,
    ) -> GraphResult<(Endpoint, &Pad)> {
        let endpoint = self.resolve(&Endpoint::new(node_id, pad))?;
        let leaf = self.pad(&endpoint)?;
        if leaf.direction() != expected {
            return Err(GraphError::DirectionMismatch {
                node_id,
                pad: pad.to_string(),
                expected,
            });
        }
        Ok((endpoint, leaf))
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Connect an output pad to an input pad.
    ///
    /// Either side may be a proxy pad of a nested graph; the connection is
    /// made between the leaf pads behind them. A rejected connection leaves
    /// the graph unchanged.
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_pad: impl Into<String>,
        to_node: NodeId,
        to_pad: impl Into<String>,
    ) -> GraphResult<ConnectionId> {
        let from_pad = from_pad.into();
        let to_pad = to_pad.into();

        let (from, source) = self.resolve_pad(from_node, &from_pad, PadDirection::Output)?;
        let (to, sink) = self.resolve_pad(to_node, &to_pad, PadDirection::Input)?;

        if !source.pad_type().compatible_with(&sink.pad_type()) {
            return Err(GraphError::TypeMismatch {
                from_type: source.pad_type(),
                to_type: sink.pad_type(),
            });
        }

        if sink.is_connected() {
            return Err(GraphError::AlreadyConnected {
                node_id: to_node,
                pad: to_pad,
            });
        }

        // If the source is reachable from the sink, the new edge closes a loop
        if self.is_reachable(to.node_id, from.node_id) {
            return Err(GraphError::CycleDetected {
                upstream: from.node_id,
                downstream: to.node_id,
            });
        }

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        let connection = Connection::new(id, from.clone(), to.clone());

        self.attach(&from, id)?;
        self.attach(&to, id)?;
        log::debug!("Connected {} ({})", connection, id);
        self.connections.insert(id, connection);

        self.cache.invalidate_node(to.node_id);
        Ok(id)
    }

    fn attach(&mut self, endpoint: &Endpoint, id: ConnectionId) -> GraphResult<()> {
        self.pad_mut(endpoint)?.attach(id);
        Ok(())
    }

    fn pad_mut(&mut self, endpoint: &Endpoint) -> GraphResult<&mut Pad> {
        self.get_node_mut(endpoint.node_id)?
            .get_pad_mut(&endpoint.pad)
            .ok_or_else(|| GraphError::UnknownPad {
                node_id: endpoint.node_id,
                pad: endpoint.pad.clone(),
            })
    }

    /// Remove the connection between two pads, if there is one.
    pub fn disconnect(
        &mut self,
        from_node: NodeId,
        from_pad: &str,
        to_node: NodeId,
        to_pad: &str,
    ) -> GraphResult<Option<Connection>> {
        let (from, _) = self.resolve_pad(from_node, from_pad, PadDirection::Output)?;
        let (to, _) = self.resolve_pad(to_node, to_pad, PadDirection::Input)?;

        let found = self
            .connections
            .values()
            .find(|c| c.joins(&from, &to))
            .map(|c| c.id);

        match found {
            Some(id) => self.remove_connection(id).map(Some),
            None => Ok(None),
        }
    }

    /// Remove a connection by ID.
    pub fn remove_connection(&mut self, id: ConnectionId) -> GraphResult<Connection> {
        let connection = self
            .connections
            .shift_remove(&id)
            .ok_or(GraphError::ConnectionNotFound(id))?;

        for endpoint in [&connection.from, &connection.to] {
            if let Ok(pad) = self.pad_mut(endpoint) {
                pad.detach(id);
            }
        }

        self.cache.invalidate_connection(id);
        log::debug!("Disconnected {} ({})", connection, id);
        Ok(connection)
    }

    /// Remove whatever feeds an input pad.
    pub fn disconnect_input(&mut self, node_id: NodeId, pad: &str) -> GraphResult<Option<Connection>> {
        let (to, _) = self.resolve_pad(node_id, pad, PadDirection::Input)?;
        match self.incoming(&to).map(|c| c.id) {
            Some(id) => self.remove_connection(id).map(Some),
            None => Ok(None),
        }
    }

    /// Get a connection by ID.
    pub fn get_connection(&self, id: ConnectionId) -> GraphResult<&Connection> {
        self.connections
            .get(&id)
            .ok_or(GraphError::ConnectionNotFound(id))
    }

    /// Get all connections.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Get all connections leaving a leaf node.
    pub fn connections_from(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .values()
            .filter(move |c| c.from.node_id == node_id)
    }

    /// Get all connections entering a leaf node.
    pub fn connections_to(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .values()
            .filter(move |c| c.to.node_id == node_id)
    }

    /// The connection feeding a leaf input pad.
    pub fn incoming(&self, input: &Endpoint) -> Option<&Connection> {
        let pad = self.pad(input).ok()?;
        pad.connections()
            .first()
            .and_then(|id| self.connections.get(id))
    }

    /// Connections leaving a leaf output pad, in the order they were made.
    pub fn outgoing(&self, output: &Endpoint) -> Vec<&Connection> {
        match self.pad(output) {
            Ok(pad) => pad
                .connections()
                .iter()
                .filter_map(|id| self.connections.get(id))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Source pads feeding an input pad.
    ///
    /// At most one, since an input takes a single connection. Proxies are
    /// resolved first.
    pub fn connected_sources(&self, node_id: NodeId, pad: &str) -> GraphResult<Vec<Endpoint>> {
        let (to, _) = self.resolve_pad(node_id, pad, PadDirection::Input)?;
        Ok(self.incoming(&to).map(|c| c.from.clone()).into_iter().collect())
    }

    /// Input pads fed by an output pad.
    pub fn connected_sinks(&self, node_id: NodeId, pad: &str) -> GraphResult<Vec<Endpoint>> {
        let (from, _) = self.resolve_pad(node_id, pad, PadDirection::Output)?;
        Ok(self.outgoing(&from).into_iter().map(|c| c.to.clone()).collect())
    }

    /// The source pad feeding an input pad, if any.
    pub fn connected_to(&self, node_id: NodeId, pad: &str) -> GraphResult<Option<Endpoint>> {
        Ok(self.connected_sources(node_id, pad)?.into_iter().next())
    }

    /// Check if an input pad is already connected.
    pub fn is_input_connected(&self, node_id: NodeId, pad: &str) -> bool {
        self.connected_to(node_id, pad)
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    /// Get the number of connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ========================================================================
    // Nested Graphs
    // ========================================================================

    /// Make `child` a member of the graph node `graph`.
    ///
    /// Adding a child to the graph it already belongs to is a no-op.
    pub fn add_child(&mut self, graph: NodeId, child: NodeId) -> GraphResult<()> {
        if !self.get_node(graph)?.is_graph() {
            return Err(GraphError::NotAGraph(graph));
        }
        let child_node = self.get_node(child)?;
        match child_node.parent {
            Some(parent) if parent == graph => return Ok(()),
            Some(parent) => {
                return Err(GraphError::AlreadyParented {
                    node_id: child,
                    parent,
                })
            }
            None => {}
        }
        if child == graph || self.ancestors(graph).contains(&child) {
            return Err(GraphError::InvalidNesting { graph, child });
        }

        if let Some(g) = self.get_node_mut(graph)?.graph_operation_mut() {
            g.push_child(child);
        }
        self.get_node_mut(child)?.parent = Some(graph);
        log::debug!("Node {} added to graph {}", child, graph);
        Ok(())
    }

    /// Move `child` out of `graph` to the top level.
    ///
    /// Proxy pads that reached into the child are dropped, on `graph` and on
    /// any graph enclosing it. The child's connections stay.
    pub fn remove_child(&mut self, graph: NodeId, child: NodeId) -> GraphResult<()> {
        let graph_node = self.get_node(graph)?;
        let g = graph_node
            .graph_operation()
            .ok_or(GraphError::NotAGraph(graph))?;
        if !g.contains(child) {
            return Err(GraphError::NotAChild { graph, child });
        }
        self.unparent(graph, child);
        log::debug!("Node {} removed from graph {}", child, graph);
        Ok(())
    }

    fn unparent(&mut self, graph: NodeId, child: NodeId) {
        if let Some(g) = self.nodes.get_mut(&graph).and_then(|n| n.graph_operation_mut()) {
            g.remove_child(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }

        let mut dropped = self.drop_proxies(graph, |target| target.node_id == child);
        let mut current = self.nodes.get(&graph).and_then(|n| n.parent);
        while let Some(ancestor) = current {
            if dropped.is_empty() {
                break;
            }
            let gone: HashSet<Endpoint> = dropped.into_iter().collect();
            dropped = self.drop_proxies(ancestor, |target| gone.contains(target));
            current = self.nodes.get(&ancestor).and_then(|n| n.parent);
        }
    }

    fn drop_proxies(&mut self, graph: NodeId, hits: impl Fn(&Endpoint) -> bool) -> Vec<Endpoint> {
        let Some(node) = self.nodes.get_mut(&graph) else {
            return Vec::new();
        };
        let names: Vec<String> = node
            .pads()
            .filter(|p| p.proxy_for().map_or(false, &hits))
            .map(|p| p.name().to_string())
            .collect();
        for name in &names {
            node.remove_pad(name);
        }
        names.into_iter().map(|n| Endpoint::new(graph, n)).collect()
    }

    /// Expose `child_pad` of `child` on `graph` under `external_name`.
    pub fn expose_pad(
        &mut self,
        graph: NodeId,
        child: NodeId,
        child_pad: &str,
        external_name: impl Into<String>,
    ) -> GraphResult<()> {
        let external_name = external_name.into();
        let graph_node = self.get_node(graph)?;
        let g = graph_node
            .graph_operation()
            .ok_or(GraphError::NotAGraph(graph))?;
        if !g.contains(child) {
            return Err(GraphError::NotAChild { graph, child });
        }
        if graph_node.get_pad(&external_name).is_some() {
            return Err(GraphError::DuplicatePad {
                node_id: graph,
                pad: external_name,
            });
        }

        let target = Endpoint::new(child, child_pad);
        let proxy = Pad::proxy(external_name.clone(), self.pad(&target)?, target);
        self.get_node_mut(graph)?.insert_pad(proxy);
        log::debug!("Graph {} exposes {}.{} as '{}'", graph, child, child_pad, external_name);
        Ok(())
    }

    /// Enclosing graphs of a node, innermost first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            if result.contains(&parent) {
                break;
            }
            result.push(parent);
            current = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        result
    }

    /// Children of a graph node.
    pub fn children(&self, graph: NodeId) -> GraphResult<&[NodeId]> {
        self.get_node(graph)?
            .graph_operation()
            .map(|g| g.children())
            .ok_or(GraphError::NotAGraph(graph))
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Change a property of a leaf node.
    ///
    /// The value is checked against the declared property before the
    /// operation sees it. Cached regions computed from the node are dropped.
    pub fn set_property(&mut self, node_id: NodeId, name: &str, value: Value) -> GraphResult<()> {
        let node = self.get_node_mut(node_id)?;
        let op = node.operation_mut().ok_or_else(|| GraphError::UnknownProperty {
            node_id,
            property: name.to_string(),
        })?;

        let metadata = op.metadata();
        let definition = metadata
            .get_property(name)
            .ok_or_else(|| GraphError::UnknownProperty {
                node_id,
                property: name.to_string(),
            })?;
        let invalid = |reason: String| GraphError::InvalidProperty {
            node_id,
            property: name.to_string(),
            reason,
        };
        definition.validate(&value).map_err(invalid)?;
        op.set_property(name, &value).map_err(invalid)?;

        log::debug!("Set {}.{} = {}", node_id, name, value);
        self.cache.invalidate_node(node_id);
        Ok(())
    }

    /// Current value of a property, falling back to its declared default.
    pub fn property(&self, node_id: NodeId, name: &str) -> GraphResult<Value> {
        let unknown = || GraphError::UnknownProperty {
            node_id,
            property: name.to_string(),
        };
        let op = self.get_node(node_id)?.operation().ok_or_else(unknown)?;
        if let Some(value) = op.property(name) {
            return Ok(value);
        }
        op.metadata()
            .get_property(name)
            .map(|p| p.default_value.clone())
            .ok_or_else(unknown)
    }

    // ========================================================================
    // Graph Analysis
    // ========================================================================

    /// Check if `target` is reachable from `start` following connections.
    pub fn is_reachable(&self, start: NodeId, target: NodeId) -> bool {
        if start == target {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }

            if visited.insert(current) {
                for conn in self.connections_from(current) {
                    queue.push_back(conn.to.node_id);
                }
            }
        }

        false
    }

    /// Get all leaf nodes that depend on the given node (downstream).
    pub fn get_downstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.walk(node_id, |c| (c.from.node_id, c.to.node_id))
    }

    /// Get all leaf nodes this node depends on (upstream).
    pub fn get_upstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.walk(node_id, |c| (c.to.node_id, c.from.node_id))
    }

    fn walk(&self, node_id: NodeId, step: impl Fn(&Connection) -> (NodeId, NodeId)) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(node_id);

        while let Some(current) = queue.pop_front() {
            for conn in self.connections.values() {
                let (here, next) = step(conn);
                if here == current && visited.insert(next) {
                    result.push(next);
                    queue.push_back(next);
                }
            }
        }

        result
    }

    /// Leaf nodes with no connected inputs.
    pub fn source_nodes(&self) -> Vec<NodeId> {
        self.operation_nodes()
            .filter(|n| n.input_pads().all(|p| !p.is_connected()))
            .map(|n| n.id())
            .collect()
    }

    /// Leaf nodes whose outputs feed nothing.
    pub fn sink_nodes(&self) -> Vec<NodeId> {
        self.operation_nodes()
            .filter(|n| n.output_pads().all(|p| !p.is_connected()))
            .map(|n| n.id())
            .collect()
    }
}
