//! On-disk configuration (`jfmt.toml`): the serde-facing mirror of
//! [`SecurityLimits`] plus the mode/classpath/rule options from spec.md §6,
//! loaded once and converted into a [`crate::context::ProcessingContext`]
//! builder input.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::limits::SecurityLimits;
use crate::report::OutputFormat;

/// Errors raised loading or parsing `jfmt.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityLimitsConfig {
    pub max_source_size_bytes: u64,
    pub max_token_count: usize,
    pub max_arena_capacity: usize,
    pub max_node_depth: u32,
    pub max_parse_depth: u32,
    pub parsing_timeout_ms: u64,
    pub max_heap_usage_bytes: u64,
}

impl Default for SecurityLimitsConfig {
    fn default() -> Self {
        let limits = SecurityLimits::default();
        SecurityLimitsConfig {
            max_source_size_bytes: limits.max_source_size_bytes,
            max_token_count: limits.max_token_count,
            max_arena_capacity: limits.max_arena_capacity,
            max_node_depth: limits.max_node_depth,
            max_parse_depth: limits.max_parse_depth,
            parsing_timeout_ms: limits.parsing_timeout_ms,
            max_heap_usage_bytes: limits.max_heap_usage_bytes,
        }
    }
}

impl From<SecurityLimitsConfig> for SecurityLimits {
    fn from(config: SecurityLimitsConfig) -> Self {
        let defaults = SecurityLimits::default();
        SecurityLimits {
            max_source_size_bytes: config.max_source_size_bytes,
            max_token_count: config.max_token_count,
            max_arena_capacity: config.max_arena_capacity,
            max_node_depth: config.max_node_depth,
            max_parse_depth: config.max_parse_depth,
            parsing_timeout_ms: config.parsing_timeout_ms,
            max_heap_usage_bytes: config.max_heap_usage_bytes,
            depth_warn_threshold: defaults.depth_warn_threshold,
        }
    }
}

/// The root of `jfmt.toml`. Every field is optional in the TOML source;
/// missing fields fall back to the documented defaults (spec.md §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    pub limits: SecurityLimitsConfig,
    pub validation_only: bool,
    pub output_format: Option<OutputFormat>,
    pub classpath_entries: Vec<PathBuf>,
    pub module_path_entries: Vec<PathBuf>,
    pub max_parallel_files: Option<usize>,
}

impl FormatterConfig {
    /// Loads and parses `path`. A missing file is not defaulted here —
    /// callers deciding "use defaults when absent" should check
    /// `path.exists()` first; a present-but-unreadable-or-malformed file is
    /// always an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io { path: path.to_path_buf(), source: e })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: e })
    }

    pub fn security_limits(&self) -> SecurityLimits {
        self.limits.clone().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_mirrors_security_limits_defaults() {
        let config = FormatterConfig::default();
        assert_eq!(config.security_limits(), SecurityLimits::default());
    }

    #[test]
    fn loads_partial_toml_and_fills_in_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("jfmt.toml");
        std::fs::write(&path, "validation_only = true\n\n[limits]\nmax_source_size_bytes = 1024\n").unwrap();

        let config = FormatterConfig::load(&path).unwrap();
        assert!(config.validation_only);
        assert_eq!(config.limits.max_source_size_bytes, 1024);
        assert_eq!(config.limits.max_token_count, SecurityLimits::default().max_token_count);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("jfmt.toml");
        std::fs::write(&path, "this is not valid toml =====").unwrap();

        let err = FormatterConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = FormatterConfig::load("/does/not/exist/jfmt.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
