//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How destination collisions are settled when nobody is asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConflictPolicy {
    /// Ask the interactive handler for every file conflict.
    #[default]
    Ask,
    /// Always keep the existing entry.
    Skip,
    /// Always replace the existing entry.
    Overwrite,
    /// Always pick a free "name (n)" variant.
    Rename,
}

/// Configuration threaded into the planner, resolver and executor.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EngineConfig {
    /// Conflict policy used when an operation does not choose one.
    #[builder(default)]
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    /// Rename directory-onto-directory collisions instead of merging.
    #[builder(default = "false")]
    #[serde(default)]
    pub strict_directory_conflicts: bool,

    /// Upper bound on "name (n)" probes.
    #[builder(default = "1000")]
    #[serde(default = "default_max_rename_probes")]
    pub max_rename_probes: u32,

    /// Immediate retries for transient errors.
    #[builder(default = "1")]
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    /// Minimum interval between progress emissions, in milliseconds.
    #[builder(default = "100")]
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Number of operations kept in the undo history.
    #[builder(default = "100")]
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,

    /// Copy timestamps and permissions onto new entries.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub preserve_metadata: bool,

    /// Buffer size for streamed copies.
    #[builder(default = "64 * 1024")]
    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,

    /// Staging trash directory. `None` uses the platform trash.
    #[builder(default)]
    #[serde(default)]
    pub trash_dir: Option<PathBuf>,
}

fn default_max_rename_probes() -> u32 {
    1000
}

fn default_transient_retries() -> u32 {
    1
}

fn default_progress_interval_ms() -> u64 {
    100
}

fn default_history_depth() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_copy_buffer_size() -> usize {
    64 * 1024
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_rename_probes == Some(0) {
            return Err("max_rename_probes must be at least 1".to_string());
        }
        if self.history_depth == Some(0) {
            return Err("history_depth must be at least 1".to_string());
        }
        if self.copy_buffer_size == Some(0) {
            return Err("copy_buffer_size must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl EngineConfig {
    /// Create a new config builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load a TOML config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the user config file if it exists, otherwise defaults.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/caravan/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("caravan").join("config.toml"))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::Ask,
            strict_directory_conflicts: false,
            max_rename_probes: default_max_rename_probes(),
            transient_retries: default_transient_retries(),
            progress_interval_ms: default_progress_interval_ms(),
            history_depth: default_history_depth(),
            preserve_metadata: true,
            copy_buffer_size: default_copy_buffer_size(),
            trash_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::builder()
            .conflict_policy(ConflictPolicy::Rename)
            .max_rename_probes(5u32)
            .trash_dir(Some(PathBuf::from("/tmp/trash")))
            .build()
            .unwrap();

        assert_eq!(config.conflict_policy, ConflictPolicy::Rename);
        assert_eq!(config.max_rename_probes, 5);
        assert_eq!(config.transient_retries, 1);
        assert!(config.preserve_metadata);
    }

    #[test]
    fn test_config_builder_rejects_zero_probes() {
        assert!(EngineConfig::builder().max_rename_probes(0u32).build().is_err());
    }

    #[test]
    fn test_config_from_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("conflict_policy = \"skip\"\n").unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::Skip);
        assert_eq!(config.history_depth, 100);
        assert_eq!(config.progress_interval(), Duration::from_millis(100));
    }
}
