//! Validation module for pre-request checking.
//!
//! The validation pipeline runs before a request to catch errors early.

pub mod pipeline;
pub mod stages;

pub use pipeline::ValidationPipeline;
pub use stages::{
    AcyclicValidation, PropertyValidation, StructuralValidation, TypeValidation, ValidationStage,
};
