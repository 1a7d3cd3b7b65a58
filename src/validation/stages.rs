//! Individual validation stages.
//!
//! Each stage checks for a specific category of errors.

use crate::core::error::{ValidationError, ValidationWarning};
use crate::graph::connection::Endpoint;
use crate::graph::structure::ProcessingGraph;
use crate::graph::topology::TopologyAnalyzer;

/// Trait for validation stages.
pub trait ValidationStage: Send + Sync {
    /// Name of this validation stage.
    fn name(&self) -> &str;

    /// Validate the graph.
    ///
    /// Returns Ok with warnings, or Err with errors.
    fn validate(
        &self,
        graph: &ProcessingGraph,
    ) -> Result<Vec<ValidationWarning>, Vec<ValidationError>>;
}

/// Structural validation - checks graph structure.
///
/// Verifies:
/// - Every connection joins two existing pads
/// - Every proxy pad still points at a pad
///
/// Warns about unconnected required inputs, empty nested graphs and
/// disconnected parts of the graph.
pub struct StructuralValidation;

impl ValidationStage for StructuralValidation {
    fn name(&self) -> &str {
        "Structural Validation"
    }

    fn validate(
        &self,
        graph: &ProcessingGraph,
    ) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Empty graph warning (not error - might be intentional)
        if graph.node_count() == 0 {
            warnings.push(ValidationWarning {
                message: "Graph is empty".to_string(),
                node_id: None,
                suggestion: Some("Add operation nodes to build a pipeline".to_string()),
            });
            return Ok(warnings);
        }

        for conn in graph.connections() {
            if graph.pad(&conn.from).is_err() || graph.pad(&conn.to).is_err() {
                errors.push(ValidationError::BrokenConnection { connection: conn.id });
            }
        }

        for node in graph.nodes() {
            if node.is_graph() {
                for pad in node.pads() {
                    let endpoint = Endpoint::new(node.id(), pad.name());
                    if graph.resolve(&endpoint).is_err() {
                        errors.push(ValidationError::DanglingProxy {
                            node_id: node.id(),
                            pad: pad.name().to_string(),
                        });
                    }
                }
                if graph.children(node.id()).map_or(true, |c| c.is_empty()) {
                    warnings.push(
                        ValidationWarning::for_node(
                            node.id(),
                            format!("Graph '{}' has no children", node.display_name()),
                        )
                        .with_suggestion("Remove it or add nodes to it"),
                    );
                }
                continue;
            }

            for pad in node.input_pads() {
                if !pad.is_optional() && !pad.is_connected() {
                    warnings.push(
                        ValidationWarning::for_node(
                            node.id(),
                            format!(
                                "Input '{}' of '{}' is not connected and will read nothing",
                                pad.name(),
                                node.display_name()
                            ),
                        )
                        .with_suggestion(format!("Connect a source to '{}'", pad.name())),
                    );
                }
            }
        }

        // Check for disconnected subgraphs (warning)
        let subgraphs = TopologyAnalyzer::new(graph).find_subgraphs();
        if subgraphs.len() > 1 {
            warnings.push(ValidationWarning {
                message: format!("Graph contains {} disconnected subgraphs", subgraphs.len()),
                node_id: None,
                suggestion: Some("Consider connecting all parts or removing unused nodes".to_string()),
            });
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors)
        }
    }
}

/// Type validation - checks that every connection carries a compatible type.
pub struct TypeValidation;

impl ValidationStage for TypeValidation {
    fn name(&self) -> &str {
        "Type Validation"
    }

    fn validate(
        &self,
        graph: &ProcessingGraph,
    ) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        let mut errors = Vec::new();

        for conn in graph.connections() {
            // Missing pads are reported by the structural stage
            let (Ok(from), Ok(to)) = (graph.pad(&conn.from), graph.pad(&conn.to)) else {
                continue;
            };
            if !from.pad_type().compatible_with(&to.pad_type()) {
                errors.push(ValidationError::TypeMismatch {
                    connection: conn.id,
                    from_type: from.pad_type(),
                    to_type: to.pad_type(),
                });
            }
        }

        if errors.is_empty() {
            Ok(Vec::new())
        } else {
            Err(errors)
        }
    }
}

/// Acyclicity validation over the flattened graph.
pub struct AcyclicValidation;

impl ValidationStage for AcyclicValidation {
    fn name(&self) -> &str {
        "Acyclic Validation"
    }

    fn validate(
        &self,
        graph: &ProcessingGraph,
    ) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        if TopologyAnalyzer::new(graph).has_cycle() {
            Err(vec![ValidationError::CycleDetected])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Property validation - checks current property values against their
/// declarations.
pub struct PropertyValidation;

impl ValidationStage for PropertyValidation {
    fn name(&self) -> &str {
        "Property Validation"
    }

    fn validate(
        &self,
        graph: &ProcessingGraph,
    ) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        let mut errors = Vec::new();

        for node in graph.operation_nodes() {
            let Some(op) = node.operation() else {
                continue;
            };
            for definition in &op.metadata().properties {
                let value = op
                    .property(&definition.name)
                    .unwrap_or_else(|| definition.default_value.clone());
                if let Err(reason) = definition.validate(&value) {
                    errors.push(ValidationError::InvalidProperty {
                        node_id: node.id(),
                        property: definition.name.clone(),
                        reason,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(Vec::new())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::Nop;

    #[test]
    fn test_structural_validation_empty_graph() {
        let graph = ProcessingGraph::new();
        let warnings = StructuralValidation.validate(&graph).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_unconnected_input_warns() {
        let mut graph = ProcessingGraph::new();
        let a = graph.add_operation(Box::new(Nop));
        let b = graph.add_operation(Box::new(Nop));
        graph.connect(a, "output", b, "input").unwrap();

        let warnings = StructuralValidation.validate(&graph).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].node_id, Some(a));
    }

    #[test]
    fn test_dangling_proxy_is_error() {
        let mut graph = ProcessingGraph::new();
        let group = graph.add_graph("group");
        let inner = graph.add_operation(Box::new(Nop));
        graph.add_child(group, inner).unwrap();
        graph.expose_pad(group, inner, "output", "out").unwrap();
        graph.get_node_mut(inner).unwrap().remove_pad("output");

        let errors = StructuralValidation.validate(&graph).unwrap_err();
        assert!(matches!(
            &errors[0],
            ValidationError::DanglingProxy { node_id, pad } if *node_id == group && pad == "out"
        ));
    }

    #[test]
    fn test_empty_nested_graph_warns() {
        let mut graph = ProcessingGraph::new();
        let group = graph.add_graph("empty");
        let warnings = StructuralValidation.validate(&graph).unwrap();
        assert!(warnings.iter().any(|w| w.node_id == Some(group)));
    }

    #[test]
    fn test_type_and_cycle_stages_pass() {
        let mut graph = ProcessingGraph::new();
        let a = graph.add_operation(Box::new(Nop));
        let b = graph.add_operation(Box::new(Nop));
        graph.connect(a, "output", b, "input").unwrap();

        assert!(TypeValidation.validate(&graph).is_ok());
        assert!(AcyclicValidation.validate(&graph).is_ok());
        assert!(PropertyValidation.validate(&graph).is_ok());
    }
}
