//! Node instances and their pads.
//!
//! A [`GraphNode`] is either a leaf wrapping an [`Operation`] or a nested
//! graph ([`GraphOperation`]) whose pads are proxies onto its children.

use crate::core::error::{ConnectionId, NodeId};
use crate::core::node::Operation;
use crate::core::pad::{PadDefinition, PadDirection};
use crate::core::types::PadType;
use crate::graph::connection::Endpoint;
use indexmap::IndexMap;
use std::fmt;

/// A pad instance on a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Pad {
    name: String,
    direction: PadDirection,
    pad_type: PadType,
    optional: bool,
    connections: Vec<ConnectionId>,
    proxy_for: Option<Endpoint>,
}

impl Pad {
    /// Instantiate a pad from its declaration.
    pub fn from_definition(definition: &PadDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            direction: definition.direction,
            pad_type: definition.pad_type,
            optional: definition.optional,
            connections: Vec::new(),
            proxy_for: None,
        }
    }

    /// A proxy forwarding to `target`, mirroring the target's declaration.
    pub(crate) fn proxy(name: impl Into<String>, target: &Pad, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            direction: target.direction,
            pad_type: target.pad_type,
            optional: target.optional,
            connections: Vec::new(),
            proxy_for: Some(endpoint),
        }
    }

    /// Pad name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input or output.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// Declared type.
    pub fn pad_type(&self) -> PadType {
        self.pad_type
    }

    /// Whether the owning operation tolerates this pad being unconnected.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_input(&self) -> bool {
        self.direction == PadDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == PadDirection::Output
    }

    /// The child pad this proxy forwards to, if it is a proxy.
    pub fn proxy_for(&self) -> Option<&Endpoint> {
        self.proxy_for.as_ref()
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy_for.is_some()
    }

    /// Connections attached to this pad, in the order they were made.
    ///
    /// Always empty for proxies; their connections live on the leaf pad.
    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }

    pub fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }

    pub(crate) fn attach(&mut self, id: ConnectionId) {
        self.connections.push(id);
    }

    pub(crate) fn detach(&mut self, id: ConnectionId) {
        self.connections.retain(|c| *c != id);
    }
}

/// The internals of a nested graph node.
#[derive(Debug, Clone, Default)]
pub struct GraphOperation {
    name: String,
    children: Vec<NodeId>,
}

impl GraphOperation {
    /// Create an empty graph operation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Graph name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Child nodes, in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn contains(&self, child: NodeId) -> bool {
        self.children.contains(&child)
    }

    pub(crate) fn push_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    pub(crate) fn remove_child(&mut self, child: NodeId) {
        self.children.retain(|c| *c != child);
    }
}

/// What a node computes.
#[derive(Clone)]
pub enum NodeKind {
    /// A leaf operation.
    Operation(Box<dyn Operation>),
    /// A nested graph reached through proxy pads.
    Graph(GraphOperation),
}

/// A node instance in the graph.
#[derive(Clone)]
pub struct GraphNode {
    pub(crate) id: NodeId,
    kind: NodeKind,
    pads: IndexMap<String, Pad>,
    pub(crate) parent: Option<NodeId>,
    /// Optional display name override
    pub label: Option<String>,
    /// Whether results of this node are kept in the region cache
    pub cache: bool,
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("name", &self.display_name())
            .field("pads", &self.pads.keys().collect::<Vec<_>>())
            .field("parent", &self.parent)
            .field("cache", &self.cache)
            .finish()
    }
}

impl GraphNode {
    /// Create a leaf node; one pad is created per declared pad.
    pub fn new(operation: Box<dyn Operation>) -> Self {
        let metadata = operation.metadata();
        let mut pads = IndexMap::new();
        for definition in metadata.pads() {
            if pads.contains_key(&definition.name) {
                log::warn!(
                    "Operation '{}' declares pad '{}' twice; keeping the first",
                    metadata.id,
                    definition.name
                );
                continue;
            }
            pads.insert(definition.name.clone(), Pad::from_definition(definition));
        }
        Self {
            id: NodeId(0),
            kind: NodeKind::Operation(operation),
            pads,
            parent: None,
            label: None,
            cache: false,
        }
    }

    /// Create an empty nested graph node.
    pub fn graph(name: impl Into<String>) -> Self {
        Self {
            id: NodeId(0),
            kind: NodeKind::Graph(GraphOperation::new(name)),
            pads: IndexMap::new(),
            parent: None,
            label: None,
            cache: false,
        }
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Enable or disable region caching for this node.
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Handle assigned by the owning graph.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The wrapped operation, for leaf nodes.
    pub fn operation(&self) -> Option<&dyn Operation> {
        match &self.kind {
            NodeKind::Operation(op) => Some(op.as_ref()),
            NodeKind::Graph(_) => None,
        }
    }

    pub(crate) fn operation_mut(&mut self) -> Option<&mut Box<dyn Operation>> {
        match &mut self.kind {
            NodeKind::Operation(op) => Some(op),
            NodeKind::Graph(_) => None,
        }
    }

    /// The nested graph, for graph nodes.
    pub fn graph_operation(&self) -> Option<&GraphOperation> {
        match &self.kind {
            NodeKind::Graph(g) => Some(g),
            NodeKind::Operation(_) => None,
        }
    }

    pub(crate) fn graph_operation_mut(&mut self) -> Option<&mut GraphOperation> {
        match &mut self.kind {
            NodeKind::Graph(g) => Some(g),
            NodeKind::Operation(_) => None,
        }
    }

    pub fn is_graph(&self) -> bool {
        matches!(self.kind, NodeKind::Graph(_))
    }

    /// The graph this node belongs to, if any.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// All pads, in declaration order.
    pub fn pads(&self) -> impl Iterator<Item = &Pad> {
        self.pads.values()
    }

    /// Look up a pad by name.
    pub fn get_pad(&self, name: &str) -> Option<&Pad> {
        self.pads.get(name)
    }

    pub(crate) fn get_pad_mut(&mut self, name: &str) -> Option<&mut Pad> {
        self.pads.get_mut(name)
    }

    pub(crate) fn insert_pad(&mut self, pad: Pad) {
        self.pads.insert(pad.name.clone(), pad);
    }

    pub(crate) fn remove_pad(&mut self, name: &str) -> Option<Pad> {
        self.pads.shift_remove(name)
    }

    /// Input pads, in declaration order.
    pub fn input_pads(&self) -> impl Iterator<Item = &Pad> {
        self.pads.values().filter(|p| p.is_input())
    }

    /// Output pads, in declaration order.
    pub fn output_pads(&self) -> impl Iterator<Item = &Pad> {
        self.pads.values().filter(|p| p.is_output())
    }

    /// Label, operation name, or graph name.
    pub fn display_name(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.kind {
            NodeKind::Operation(op) => op.metadata().name,
            NodeKind::Graph(g) => g.name().to_string(),
        }
    }

    /// Operation type id, or `graph` for nested graphs.
    pub fn type_id(&self) -> String {
        match &self.kind {
            NodeKind::Operation(op) => op.metadata().id,
            NodeKind::Graph(_) => "graph".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::Nop;

    #[test]
    fn test_pads_created_from_metadata() {
        let node = GraphNode::new(Box::new(Nop));

        assert_eq!(node.pads().count(), 2);
        let input = node.get_pad("input").unwrap();
        assert!(input.is_input());
        assert!(!input.is_connected());
        assert!(node.get_pad("output").unwrap().is_output());
        assert!(node.get_pad("aux").is_none());
    }

    #[test]
    fn test_graph_node() {
        let node = GraphNode::graph("group").with_label("My Group").with_cache(true);
        assert!(node.is_graph());
        assert!(node.operation().is_none());
        assert_eq!(node.display_name(), "My Group");
        assert_eq!(node.type_id(), "graph");
        assert!(node.cache);
        assert_eq!(node.pads().count(), 0);
    }

    #[test]
    fn test_pad_attach_detach() {
        let mut node = GraphNode::new(Box::new(Nop));
        let pad = node.get_pad_mut("output").unwrap();
        pad.attach(ConnectionId(1));
        pad.attach(ConnectionId(2));
        pad.detach(ConnectionId(1));
        assert_eq!(pad.connections(), &[ConnectionId(2)]);
    }

    #[test]
    fn test_proxy_pad_mirrors_target() {
        let node = GraphNode::new(Box::new(Nop));
        let target = node.get_pad("input").unwrap();
        let proxy = Pad::proxy("in", target, Endpoint::new(NodeId(3), "input"));

        assert!(proxy.is_proxy());
        assert_eq!(proxy.direction(), PadDirection::Input);
        assert_eq!(proxy.pad_type(), target.pad_type());
        assert_eq!(proxy.proxy_for(), Some(&Endpoint::new(NodeId(3), "input")));
    }
}
