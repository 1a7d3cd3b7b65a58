//! Validation pipeline implementation.

use crate::core::error::ValidationReport;
use crate::graph::structure::ProcessingGraph;
use crate::validation::stages::{
    AcyclicValidation, PropertyValidation, StructuralValidation, TypeValidation, ValidationStage,
};
use std::time::Instant;

/// Multi-stage validation pipeline.
///
/// Runs a series of validation stages on a graph to check for errors
/// before any region is requested.
pub struct ValidationPipeline {
    stages: Vec<Box<dyn ValidationStage>>,
}

impl ValidationPipeline {
    /// Create a new pipeline with the given stages.
    pub fn new(stages: Vec<Box<dyn ValidationStage>>) -> Self {
        Self { stages }
    }

    /// Create the default validation pipeline with all standard stages.
    pub fn default_pipeline() -> Self {
        Self {
            stages: vec![
                Box::new(StructuralValidation),
                Box::new(TypeValidation),
                Box::new(AcyclicValidation),
                Box::new(PropertyValidation),
            ],
        }
    }

    /// Create a minimal pipeline (just structural and type checks).
    pub fn minimal_pipeline() -> Self {
        Self {
            stages: vec![
                Box::new(StructuralValidation),
                Box::new(TypeValidation),
            ],
        }
    }

    /// Add a custom validation stage.
    pub fn add_stage(&mut self, stage: Box<dyn ValidationStage>) {
        self.stages.push(stage);
    }

    /// Validate a graph through all stages.
    pub fn validate(&self, graph: &ProcessingGraph) -> ValidationReport {
        let start = Instant::now();
        let mut report = ValidationReport::new();

        for stage in &self.stages {
            log::trace!("Running {}", stage.name());
            match stage.validate(graph) {
                Ok(warnings) => {
                    // Add any warnings from this stage
                    for warning in warnings {
                        report.add_warning(warning);
                    }
                }
                Err(errors) => {
                    // Add errors
                    for error in errors {
                        let is_fatal = error.is_fatal();
                        report.add_error(error);

                        // Stop on fatal errors
                        if is_fatal {
                            report.duration_ms = start.elapsed().as_millis() as u64;
                            return report;
                        }
                    }
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Names of the stages, in run order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Quick validation - just check if regions can be requested.
    pub fn can_execute(&self, graph: &ProcessingGraph) -> bool {
        self.validate(graph).can_execute()
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::default_pipeline()
    }
}
