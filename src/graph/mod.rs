//! Graph module for building processing graphs.
//!
//! A processing graph is a directed acyclic graph (DAG) where nodes wrap
//! operations and connections carry pixels or scalars from output pads to
//! input pads. Graph nodes group children behind proxy pads.

pub mod connection;
pub mod node;
pub mod structure;
pub mod topology;
pub mod visitor;

// Re-export commonly used types
pub use connection::{Connection, Endpoint};
pub use node::{GraphNode, GraphOperation, NodeKind, Pad};
pub use structure::{ProcessingGraph, SharedGraph};
pub use topology::TopologyAnalyzer;
pub use visitor::{bfs_traverse, dfs_traverse, ListVisitor, Visit, Visitable, Visitor};
