//! Engine configuration.
//!
//! Settings can be loaded from a TOML file; every field has a default, so
//! an empty file is a valid configuration.
//!
//! ```toml
//! parallel = true
//! max_threads = 4
//! use_cache = true
//! cache_capacity = 512
//! cache_memory_limit_mb = 256
//! ```

use crate::core::error::ConfigError;
use crate::execution::cache::{RegionCache, DEFAULT_CAPACITY, DEFAULT_MEMORY_LIMIT_MB};
use crate::execution::engine::ExecutionOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for the execution engine and its region cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Evaluate independent nodes concurrently.
    pub parallel: bool,
    /// Worker threads for parallel evaluation (0 = rayon's default).
    pub max_threads: usize,
    /// Consult and fill the region cache.
    pub use_cache: bool,
    /// Maximum number of cached regions.
    pub cache_capacity: usize,
    /// Memory bound of the region cache in megabytes.
    pub cache_memory_limit_mb: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_threads: 0,
            use_cache: true,
            cache_capacity: DEFAULT_CAPACITY,
            cache_memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("Loaded engine config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cache_memory_limit_mb == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_memory_limit_mb".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Execution options matching this configuration.
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions::new()
            .with_parallel(self.parallel)
            .with_max_threads(self.max_threads)
            .with_cache(self.use_cache)
    }

    /// A region cache sized by this configuration.
    pub fn region_cache(&self) -> RegionCache {
        RegionCache::with_memory_limit(self.cache_capacity, self.cache_memory_limit_mb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.parallel);
        assert!(config.use_cache);
    }

    #[test]
    fn test_parse_fields() {
        let config = EngineConfig::from_toml_str(
            "parallel = true\nmax_threads = 3\nuse_cache = false\ncache_capacity = 8\n",
        )
        .unwrap();

        assert!(config.parallel);
        assert_eq!(config.max_threads, 3);
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.cache_memory_limit_mb, DEFAULT_MEMORY_LIMIT_MB);

        let options = config.execution_options();
        assert!(options.parallel);
        assert!(!options.use_cache);
        assert_eq!(options.max_threads, 3);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("cache_capacity = 0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("parallel = \"yes\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("tile_size = 64"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "parallel = true").unwrap();
        writeln!(file, "cache_memory_limit_mb = 64").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert!(config.parallel);
        assert_eq!(config.cache_memory_limit_mb, 64);

        assert!(matches!(
            EngineConfig::load(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }
}
