//! Connection types for the graph.

use crate::core::error::{ConnectionId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pad address: node handle plus pad name.
///
/// Pad names are unique within a node, so an endpoint identifies one pad.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    /// The node ID.
    pub node_id: NodeId,
    /// The pad name on that node.
    pub pad: String,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(node_id: NodeId, pad: impl Into<String>) -> Self {
        Self {
            node_id,
            pad: pad.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.pad)
    }
}

/// An edge from an output pad to an input pad.
///
/// Both endpoints are leaf pads; proxies are resolved before a connection
/// is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique identifier for this connection.
    pub id: ConnectionId,
    /// Source endpoint (output pad).
    pub from: Endpoint,
    /// Target endpoint (input pad).
    pub to: Endpoint,
}

impl Connection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, from: Endpoint, to: Endpoint) -> Self {
        Self { id, from, to }
    }

    /// Whether this connection joins the given pair of pads.
    pub fn joins(&self, from: &Endpoint, to: &Endpoint) -> bool {
        self.from == *from && self.to == *to
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let endpoint = Endpoint::new(NodeId(4), "output");

        assert_eq!(endpoint.node_id, NodeId(4));
        assert_eq!(endpoint.pad, "output");
        assert_eq!(endpoint.to_string(), "n4.output");
    }

    #[test]
    fn test_connection() {
        let from = Endpoint::new(NodeId(1), "output");
        let to = Endpoint::new(NodeId(2), "input");
        let conn = Connection::new(ConnectionId(0), from.clone(), to.clone());

        assert!(conn.joins(&from, &to));
        assert!(!conn.joins(&to, &from));
        assert_eq!(conn.to_string(), "n1.output -> n2.input");
    }
}
