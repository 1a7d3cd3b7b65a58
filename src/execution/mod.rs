//! Execution engine module.
//!
//! This module answers region requests: planning what every node must
//! produce, evaluating nodes, and caching their results.

pub mod cache;
pub mod config;
pub mod engine;
pub mod progress;

pub use cache::{new_shared_cache, CacheKey, CacheStats, Dependencies, RegionCache, SharedCache};
pub use config::EngineConfig;
pub use engine::{ExecutionEngine, ExecutionOptions, RequestOutput, RequestPlan, RequestStats};
pub use progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
