//! Runtime configuration.
//!
//! [`RuntimeConfig`] is built in code with the `with_*` methods or loaded
//! from a TOML file. Missing keys fall back to the defaults below.
//!
//! ```toml
//! arena_size = 1048576
//! max_workers = 16
//!
//! [limits]
//! max_bind_groups = 4
//! max_push_constant_size = 128
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors produced while loading or validating a [`RuntimeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Device limits enforced while recording.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceLimits {
    /// Bind group slots available when no pipeline is bound.
    pub max_bind_groups: u32,
    /// Vertex buffer slots.
    pub max_vertex_buffers: u32,
    /// Largest push-constant range a pipeline layout may declare, in bytes.
    pub max_push_constant_size: u32,
    /// Required alignment of indirect argument offsets.
    pub indirect_offset_alignment: u64,
    /// Required alignment of dynamic offsets.
    pub dynamic_offset_alignment: u32,
    /// Dynamic bindings a single bind group layout may declare.
    pub max_dynamic_offsets_per_group: u32,
    pub max_query_set_size: u32,
    /// Longest accepted debug label, in bytes.
    pub max_debug_label_len: usize,
    pub max_buffer_size: u64,
    pub max_workgroups_per_dimension: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_bind_groups: 4,
            max_vertex_buffers: 8,
            max_push_constant_size: 128,
            indirect_offset_alignment: 4,
            dynamic_offset_alignment: 256,
            max_dynamic_offsets_per_group: 8,
            max_query_set_size: 4096,
            max_debug_label_len: 1024,
            max_buffer_size: 1 << 28,
            max_workgroups_per_dimension: 65535,
        }
    }
}

/// Configuration for [`Runtime::startup`](crate::Runtime::startup).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Size of the shared arena in bytes.
    pub arena_size: u32,
    /// Bytes reserved in the arena for each worker's local storage block.
    pub worker_local_storage_size: u32,
    /// Maximum number of live workers.
    pub max_workers: u32,
    pub limits: DeviceLimits,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            arena_size: 1 << 20,
            worker_local_storage_size: 4096,
            max_workers: 64,
            limits: DeviceLimits::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arena_size(mut self, size: u32) -> Self {
        self.arena_size = size;
        self
    }

    pub fn with_worker_local_storage_size(mut self, size: u32) -> Self {
        self.worker_local_storage_size = size;
        self
    }

    pub fn with_max_workers(mut self, count: u32) -> Self {
        self.max_workers = count;
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded runtime config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Check that the values are usable together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.max_workers == 0 {
            return invalid("max_workers must be at least 1".into());
        }
        if self.worker_local_storage_size == 0 {
            return invalid("worker_local_storage_size must be at least 1".into());
        }
        let reserved = u64::from(self.worker_local_storage_size) * u64::from(self.max_workers);
        if reserved > u64::from(self.arena_size) {
            return invalid(format!(
                "{} workers x {} bytes of local storage do not fit in a {} byte arena",
                self.max_workers, self.worker_local_storage_size, self.arena_size
            ));
        }

        let limits = &self.limits;
        if limits.max_bind_groups == 0 {
            return invalid("limits.max_bind_groups must be at least 1".into());
        }
        if limits.max_push_constant_size % 4 != 0 {
            return invalid("limits.max_push_constant_size must be a multiple of 4".into());
        }
        if !limits.indirect_offset_alignment.is_power_of_two() {
            return invalid("limits.indirect_offset_alignment must be a power of two".into());
        }
        if !limits.dynamic_offset_alignment.is_power_of_two() {
            return invalid("limits.dynamic_offset_alignment must be a power of two".into());
        }
        if limits.max_query_set_size == 0 {
            return invalid("limits.max_query_set_size must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            max_workers = 4

            [limits]
            max_bind_groups = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.max_workers, 4);
        assert_eq!(config.limits.max_bind_groups, 8);
        assert_eq!(config.limits.max_vertex_buffers, 8);
        assert_eq!(config.arena_size, 1 << 20);
    }

    #[test]
    fn test_oversubscribed_arena_rejected() {
        let config = RuntimeConfig::new()
            .with_arena_size(4096)
            .with_worker_local_storage_size(1024)
            .with_max_workers(8);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let result = RuntimeConfig::from_toml_str("max_workers = \"lots\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = RuntimeConfig::load("/definitely/not/here/gpubridge.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
