//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - voxlogica.toml (default configuration)
//! - voxlogica.local.toml (git-ignored local overrides)
//! - Environment variables (`VOXLOGICA_` prefix, `__` nesting separator)
//!
//! ## Example
//!
//! ```toml
//! # voxlogica.toml
//! [storage]
//! backend = "sqlite"
//!
//! [execution]
//! strategy = "dask"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! VOXLOGICA_STORAGE__BACKEND=memory
//! VOXLOGICA_POLICY__SERVE_MODE=true
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Sqlite,
    Memory,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackendKind,
    /// sqlite database path; `None` resolves to `$HOME/.voxlogica/results.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_runtime_version")]
    pub runtime_version: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: default_storage_backend(),
            database_path: None,
            runtime_version: default_runtime_version(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategyKind {
    Strict,
    Dask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_strategy")]
    pub strategy: ExecutionStrategyKind,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            strategy: default_strategy(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            default_chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub legacy: bool,
    #[serde(default)]
    pub serve_mode: bool,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub extra_read_roots: Vec<PathBuf>,
    /// Accepted and stored for compatibility with the reference
    /// implementation's env surface; perf-report generation is out of scope.
    #[serde(default)]
    pub perf_report_dir: Option<PathBuf>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig { legacy: false, serve_mode: false, data_dir: None, extra_read_roots: Vec::new(), perf_report_dir: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), file: None, json: false }
    }
}

fn default_storage_backend() -> StorageBackendKind {
    StorageBackendKind::Sqlite
}
fn default_runtime_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_strategy() -> ExecutionStrategyKind {
    ExecutionStrategyKind::Strict
}
fn default_page_size() -> usize {
    crate::value::DEFAULT_PAGE_SIZE
}
fn default_max_page_size() -> usize {
    crate::value::MAX_PAGE_SIZE
}
fn default_chunk_size() -> usize {
    64
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::default(),
            execution: ExecutionConfig::default(),
            policy: PolicyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Merge in order: built-in defaults, `voxlogica.toml`,
    /// `voxlogica.local.toml`, then `VOXLOGICA_*` environment variables.
    pub fn load() -> ConfigResult<Self> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file("voxlogica.toml"))
            .merge(Toml::file("voxlogica.local.toml"))
            .merge(Env::prefixed("VOXLOGICA_").split("__"))
            .extract()
            .map_err(ConfigError::from)
    }

    pub fn from_file(path: &str) -> ConfigResult<Self> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("VOXLOGICA_").split("__"))
            .extract()
            .map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_sqlite_and_strict_strategy() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackendKind::Sqlite);
        assert_eq!(config.execution.strategy, ExecutionStrategyKind::Strict);
        assert_eq!(config.execution.max_page_size, 512);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("[storage]"));
        assert!(text.contains("[execution]"));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.storage.backend, config.storage.backend);
    }

    #[test]
    fn env_override_switches_storage_backend() {
        std::env::set_var("VOXLOGICA_STORAGE__BACKEND", "memory");
        let config = Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Env::prefixed("VOXLOGICA_").split("__"))
            .extract::<Config>()
            .unwrap();
        std::env::remove_var("VOXLOGICA_STORAGE__BACKEND");
        assert_eq!(config.storage.backend, StorageBackendKind::Memory);
    }
}
