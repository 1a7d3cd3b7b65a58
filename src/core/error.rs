//! Error types for Ambit.
//!
//! Uses thiserror for structured errors with context. Errors are designed to:
//! - Name the node and pad involved
//! - Leave the graph unchanged when a mutation is rejected
//! - Surface the failing node of an aborted request

use crate::core::format::{FormatPolicy, PixelFormat};
use crate::core::pad::PadDirection;
use crate::core::types::PadType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Handle of a node in a graph arena.
///
/// Handles are allocated from a counter and never reused, so a handle to a
/// removed node stays invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Handle of a connection in a graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Top-level error type for Ambit.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum AmbitError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AmbitError {
    /// The node responsible for this error, if one is known.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            AmbitError::Graph(e) => e.node_id(),
            AmbitError::Execution(e) => e.node_id(),
            _ => None,
        }
    }
}

/// Errors raised while building or mutating a graph.
///
/// A mutation that returns one of these leaves the graph as it was.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    #[error("Pad '{pad}' not found on node {node_id}")]
    UnknownPad { node_id: NodeId, pad: String },

    #[error("Input pad '{pad}' on node {node_id} is already connected")]
    AlreadyConnected { node_id: NodeId, pad: String },

    #[error("Connecting {upstream} to {downstream} would create a cycle")]
    CycleDetected { upstream: NodeId, downstream: NodeId },

    #[error("Cannot connect {from_type} to {to_type}")]
    TypeMismatch { from_type: PadType, to_type: PadType },

    #[error("Pad '{pad}' on node {node_id} is not an {expected} pad")]
    DirectionMismatch {
        node_id: NodeId,
        pad: String,
        expected: PadDirection,
    },

    #[error("Node {0} is not a graph")]
    NotAGraph(NodeId),

    #[error("Node {node_id} already belongs to graph {parent}")]
    AlreadyParented { node_id: NodeId, parent: NodeId },

    #[error("Node {child} cannot be placed inside graph {graph}")]
    InvalidNesting { graph: NodeId, child: NodeId },

    #[error("Node {child} is not a child of graph {graph}")]
    NotAChild { graph: NodeId, child: NodeId },

    #[error("Node {node_id} already has a pad named '{pad}'")]
    DuplicatePad { node_id: NodeId, pad: String },

    #[error("Proxy pad '{pad}' on graph {node_id} no longer points at a pad")]
    DanglingProxy { node_id: NodeId, pad: String },

    #[error("Node {node_id} has no property '{property}'")]
    UnknownProperty { node_id: NodeId, property: String },

    #[error("Invalid value for property '{property}' on node {node_id}: {reason}")]
    InvalidProperty {
        node_id: NodeId,
        property: String,
        reason: String,
    },
}

impl GraphError {
    /// The node this error is about, if any.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            GraphError::NodeNotFound(node_id)
            | GraphError::UnknownPad { node_id, .. }
            | GraphError::AlreadyConnected { node_id, .. }
            | GraphError::DirectionMismatch { node_id, .. }
            | GraphError::NotAGraph(node_id)
            | GraphError::AlreadyParented { node_id, .. }
            | GraphError::DuplicatePad { node_id, .. }
            | GraphError::DanglingProxy { node_id, .. }
            | GraphError::UnknownProperty { node_id, .. }
            | GraphError::InvalidProperty { node_id, .. } => Some(*node_id),
            GraphError::CycleDetected { downstream, .. } => Some(*downstream),
            GraphError::InvalidNesting { child, .. } | GraphError::NotAChild { child, .. } => {
                Some(*child)
            }
            GraphError::ConnectionNotFound(_) | GraphError::TypeMismatch { .. } => None,
        }
    }
}

/// Errors from the validation phase.
///
/// Validation errors are caught before a request is made, allowing callers
/// to fix the graph before any pixels are computed.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Connection {connection} joins incompatible pads: {from_type} to {to_type}")]
    TypeMismatch {
        connection: ConnectionId,
        from_type: PadType,
        to_type: PadType,
    },

    #[error("Connection {connection} refers to a missing pad")]
    BrokenConnection { connection: ConnectionId },

    #[error("Proxy pad '{pad}' on graph {node_id} points at a missing pad")]
    DanglingProxy { node_id: NodeId, pad: String },

    #[error("Property '{property}' on node {node_id} is out of range: {reason}")]
    InvalidProperty {
        node_id: NodeId,
        property: String,
        reason: String,
    },

    #[error("Graph contains a cycle")]
    CycleDetected,

    #[error("{0}")]
    Other(String),
}

impl ValidationError {
    /// Check if this is a fatal error that should stop validation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ValidationError::CycleDetected)
    }

    /// Get suggestion for fixing this error.
    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            ValidationError::TypeMismatch { connection, .. } => {
                Some(format!("Disconnect {} and wire a pad of matching type", connection))
            }
            ValidationError::DanglingProxy { pad, .. } => {
                Some(format!("Expose a child pad again as '{}'", pad))
            }
            _ => None,
        }
    }

    /// Get list of affected node IDs.
    pub fn affected_nodes(&self) -> Vec<NodeId> {
        match self {
            ValidationError::DanglingProxy { node_id, .. }
            | ValidationError::InvalidProperty { node_id, .. } => vec![*node_id],
            _ => vec![],
        }
    }
}

/// Errors raised while answering a region request.
///
/// Any of these aborts the whole request; buffers produced so far are dropped.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Node {node_id} cannot read pad '{pad}': {offered} does not satisfy {policy}")]
    FormatNegotiationFailure {
        node_id: NodeId,
        pad: String,
        offered: PixelFormat,
        policy: FormatPolicy,
    },

    #[error("Node {node_id} failed: {cause}")]
    OperationFailure { node_id: NodeId, cause: String },

    #[error("Cycle detected while traversing at node {node_id}")]
    CycleDetected { node_id: NodeId },

    #[error("Invalid request for pad '{pad}' on node {node_id}: {reason}")]
    InvalidRequest {
        node_id: NodeId,
        pad: String,
        reason: String,
    },

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("{0}")]
    Other(String),
}

impl ExecutionError {
    /// Shorthand for an operation failure.
    pub fn operation(node_id: NodeId, cause: impl Into<String>) -> Self {
        ExecutionError::OperationFailure {
            node_id,
            cause: cause.into(),
        }
    }

    /// Get the node ID that caused this error, if applicable.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            ExecutionError::FormatNegotiationFailure { node_id, .. }
            | ExecutionError::OperationFailure { node_id, .. }
            | ExecutionError::CycleDetected { node_id }
            | ExecutionError::InvalidRequest { node_id, .. } => Some(*node_id),
            _ => None,
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Only operation failures may be transient; everything else is a
    /// property of the graph.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ExecutionError::OperationFailure { .. })
    }

    /// Attribute this error to `node_id` as an operation failure, unless it
    /// already names a node.
    pub fn attribute_to(self, node_id: NodeId) -> Self {
        match self {
            e @ (ExecutionError::FormatNegotiationFailure { .. }
            | ExecutionError::OperationFailure { .. }
            | ExecutionError::CycleDetected { .. }
            | ExecutionError::InvalidRequest { .. }) => e,
            other => ExecutionError::operation(node_id, other.to_string()),
        }
    }
}

/// Errors from buffer access.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BufferError {
    #[error("Expected {expected} values for {rect}, got {got}")]
    SizeMismatch {
        rect: String,
        expected: usize,
        got: usize,
    },

    #[error("Cannot allocate a buffer over the infinite plane")]
    InfiniteExtent,
}

/// Errors while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

/// Result type alias for Ambit operations.
pub type AmbitResult<T> = Result<T, AmbitError>;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type alias for execution operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

// ============================================================================
// Validation Report
// ============================================================================

/// Comprehensive validation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether validation passed without errors.
    pub success: bool,
    /// List of errors found.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<ValidationWarning>,
    /// Time taken for validation in milliseconds.
    pub duration_ms: u64,
}

/// Non-fatal validation warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Warning message.
    pub message: String,
    /// Node that triggered the warning, if applicable.
    pub node_id: Option<NodeId>,
    /// Suggestion for addressing the warning.
    pub suggestion: Option<String>,
}

impl ValidationWarning {
    /// A warning about a specific node.
    pub fn for_node(node_id: NodeId, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            node_id: Some(node_id),
            suggestion: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl ValidationReport {
    /// Create a new empty report (success).
    pub fn new() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Add an error to the report.
    pub fn add_error(&mut self, error: ValidationError) {
        self.success = false;
        self.errors.push(error);
    }

    /// Add a warning to the report.
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Check if requests can be made against the graph.
    pub fn can_execute(&self) -> bool {
        self.success
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        if self.success {
            if self.warnings.is_empty() {
                "Graph is valid".to_string()
            } else {
                format!("Graph is valid with {} warning(s)", self.warnings.len())
            }
        } else {
            format!("Validation failed with {} error(s)", self.errors.len())
        }
    }

    /// Get detailed error messages with suggestions.
    pub fn detailed_errors(&self) -> Vec<String> {
        self.errors
            .iter()
            .enumerate()
            .map(|(i, error)| {
                let mut msg = format!("{}. {}", i + 1, error);
                if let Some(fix) = error.suggested_fix() {
                    msg.push_str(&format!("\n   -> Suggestion: {}", fix));
                }
                msg
            })
            .collect()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(NodeId(7).to_string(), "n7");
        assert_eq!(ConnectionId(12).to_string(), "c12");
    }

    #[test]
    fn test_graph_error_display() {
        let err = GraphError::AlreadyConnected {
            node_id: NodeId(3),
            pad: "input".to_string(),
        };
        assert!(err.to_string().contains("already connected"));
        assert_eq!(err.node_id(), Some(NodeId(3)));

        let cycle = GraphError::CycleDetected {
            upstream: NodeId(1),
            downstream: NodeId(2),
        };
        assert!(cycle.to_string().contains("cycle"));
        assert_eq!(cycle.node_id(), Some(NodeId(2)));
    }

    #[test]
    fn test_execution_error_attribution() {
        let buffer = ExecutionError::Buffer(BufferError::InfiniteExtent);
        let attributed = buffer.attribute_to(NodeId(9));
        assert_eq!(attributed.node_id(), Some(NodeId(9)));
        assert!(matches!(attributed, ExecutionError::OperationFailure { .. }));

        let failure = ExecutionError::operation(NodeId(1), "boom");
        assert_eq!(failure.attribute_to(NodeId(5)).node_id(), Some(NodeId(1)));
    }

    #[test]
    fn test_top_level_node_id() {
        let err: AmbitError = ExecutionError::operation(NodeId(4), "bad").into();
        assert_eq!(err.node_id(), Some(NodeId(4)));

        let err: AmbitError = GraphError::NodeNotFound(NodeId(2)).into();
        assert_eq!(err.node_id(), Some(NodeId(2)));
    }

    #[test]
    fn test_validation_report() {
        let mut report = ValidationReport::new();
        assert!(report.can_execute());

        report.add_warning(ValidationWarning::for_node(NodeId(1), "unconnected"));
        assert!(report.can_execute());
        assert!(report.summary().contains("1 warning"));

        report.add_error(ValidationError::CycleDetected);
        assert!(!report.can_execute());
        assert_eq!(report.detailed_errors().len(), 1);
    }
}
