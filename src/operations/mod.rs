//! Operations module.
//!
//! Contains the operation registry and built-in operation implementations.

pub mod builtin;
pub mod registry;

pub use registry::{OperationFactory, OperationRegistry, RegistryEntry};
