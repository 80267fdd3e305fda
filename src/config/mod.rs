//! Configuration module for Switchyard
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. Environment variables (`SWITCHYARD_*`)
//! 2. Configuration file (TOML)
//! 3. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use switchyard::config::{BackendMode, SwitchyardConfig};
//!
//! let config = SwitchyardConfig::default();
//! assert_eq!(config.dispatch.backend, BackendMode::Auto);
//!
//! let toml = r#"
//! [dispatch]
//! backend = "ollama"
//! "#;
//! let config: SwitchyardConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.dispatch.backend, BackendMode::Explicit("ollama".into()));
//! ```

pub mod audit;
pub mod cache;
pub mod connectivity;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod queue;

pub use audit::AuditConfig;
pub use cache::CacheConfig;
pub use connectivity::ConnectivityConfig;
pub use dedup::DedupConfig;
pub use dispatch::{BackendMode, DispatchConfig};
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use queue::{OverflowPolicy, QueueConfig};

// Re-export HealthMonitorConfig from health module
pub use crate::health::HealthMonitorConfig;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Prefix for per-backend timeout overrides, e.g. `SWITCHYARD_TIMEOUT_OLLAMA=300`.
const TIMEOUT_ENV_PREFIX: &str = "SWITCHYARD_TIMEOUT_";

/// Unified configuration for the dispatch layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SwitchyardConfig {
    /// Backend selection and timeouts
    pub dispatch: DispatchConfig,
    /// Persisted endpoint availability
    pub connectivity: ConnectivityConfig,
    /// Sliding-window backend health
    pub health: HealthMonitorConfig,
    /// Bounded priority queue
    pub queue: QueueConfig,
    /// In-flight request collapsing
    pub dedup: DedupConfig,
    /// Two-tier response cache
    pub cache: CacheConfig,
    /// Dispatch audit log
    pub audit: AuditConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl SwitchyardConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p).map_err(|source| ConfigError::Io {
                    path: p.to_path_buf(),
                    source,
                })?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `SWITCHYARD_*` environment variable overrides.
    ///
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(std::env::vars())
    }

    /// Apply overrides from an explicit set of `(name, value)` pairs.
    pub fn with_overrides_from<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            match name.as_str() {
                "SWITCHYARD_BACKEND" => self.dispatch.backend = BackendMode::from(value),
                "SWITCHYARD_LOG_LEVEL" => self.logging.level = value,
                "SWITCHYARD_LOG_FORMAT" => {
                    if let Ok(format) = value.parse() {
                        self.logging.format = format;
                    }
                }
                "SWITCHYARD_CACHE" => self.cache.enabled = value.to_lowercase() == "true",
                "SWITCHYARD_CACHE_DIR" => self.cache.dir = Some(PathBuf::from(value)),
                "SWITCHYARD_CONNECTIVITY_PATH" => {
                    self.connectivity.path = Some(PathBuf::from(value))
                }
                "SWITCHYARD_AUDIT_PATH" => self.audit.path = Some(PathBuf::from(value)),
                other => {
                    if let Some(backend) = other.strip_prefix(TIMEOUT_ENV_PREFIX) {
                        if let Ok(seconds) = value.parse::<u64>() {
                            self.dispatch
                                .timeouts
                                .insert(dispatch::env_key(backend), seconds);
                        }
                    }
                }
            }
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.default_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "dispatch.default_timeout_seconds",
                "timeout must be non-zero",
            ));
        }

        for (backend, seconds) in &self.dispatch.timeouts {
            if *seconds == 0 {
                return Err(ConfigError::invalid(
                    format!("dispatch.timeouts.{}", backend),
                    "timeout must be non-zero",
                ));
            }
        }

        let mut seen = HashSet::new();
        for (i, name) in self.dispatch.default_order.iter().enumerate() {
            let field = format!("dispatch.default_order[{}]", i);
            if name.trim().is_empty() {
                return Err(ConfigError::invalid(field, "backend name cannot be empty"));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::invalid(
                    field,
                    format!("duplicate backend '{}'", name),
                ));
            }
        }

        if self.health.window_size == 0 {
            return Err(ConfigError::invalid(
                "health.window_size",
                "window must hold at least one outcome",
            ));
        }

        if self.connectivity.failure_ttl_seconds > self.connectivity.success_ttl_seconds {
            return Err(ConfigError::invalid(
                "connectivity.failure_ttl_seconds",
                "failure verdicts must not outlive success verdicts",
            ));
        }

        if self.cache.enabled && self.cache.ttl_seconds == 0 {
            return Err(ConfigError::invalid(
                "cache.ttl_seconds",
                "ttl must be non-zero when caching is enabled",
            ));
        }

        self.logging.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_defaults() {
        let config = SwitchyardConfig::default();
        assert_eq!(config.dispatch.backend, BackendMode::Auto);
        assert_eq!(config.connectivity.success_ttl_seconds, 900);
        assert_eq!(config.connectivity.failure_ttl_seconds, 120);
        assert_eq!(config.health.window_size, 100);
        assert_eq!(config.cache.ttl_seconds, 604_800);
        assert!(config.cache.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_parse_full_toml() {
        let toml = r#"
        [dispatch]
        backend = "auto"
        default_order = ["ollama", "claude-cli"]
        default_timeout_seconds = 60

        [dispatch.timeouts]
        ollama = 300

        [connectivity]
        path = "/tmp/connectivity.json"
        failure_ttl_seconds = 60

        [health]
        window_size = 20

        [queue]
        max_size = 8
        overflow = "block"

        [cache]
        dir = "/tmp/cache"

        [logging]
        level = "debug"
        format = "json"
        "#;

        let config: SwitchyardConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.dispatch.default_order, vec!["ollama", "claude-cli"]);
        assert_eq!(
            config.dispatch.timeout_for("ollama"),
            Duration::from_secs(300)
        );
        assert_eq!(
            config.connectivity.path,
            Some(PathBuf::from("/tmp/connectivity.json"))
        );
        assert_eq!(config.connectivity.success_ttl_seconds, 900);
        assert_eq!(config.health.window_size, 20);
        assert_eq!(config.queue.overflow, OverflowPolicy::Block);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_from_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[dispatch]\nbackend = \"openai\"").unwrap();

        let config = SwitchyardConfig::load(Some(temp.path())).unwrap();
        assert_eq!(
            config.dispatch.backend,
            BackendMode::Explicit("openai".to_string())
        );
    }

    #[test]
    fn test_config_missing_file_error() {
        let result = SwitchyardConfig::load(Some(Path::new("/nonexistent/switchyard.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_config_invalid_toml_error() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[dispatch\nbackend = ").unwrap();

        let result = SwitchyardConfig::load(Some(temp.path()));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_load_none_returns_defaults() {
        let config = SwitchyardConfig::load(None).unwrap();
        assert_eq!(config.dispatch.backend, BackendMode::Auto);
    }

    #[test]
    fn test_env_override_backend() {
        let config = SwitchyardConfig::default()
            .with_overrides_from(vars(&[("SWITCHYARD_BACKEND", "claude-cli")]));
        assert_eq!(
            config.dispatch.backend,
            BackendMode::Explicit("claude-cli".to_string())
        );

        let config =
            config.with_overrides_from(vars(&[("SWITCHYARD_BACKEND", "auto")]));
        assert_eq!(config.dispatch.backend, BackendMode::Auto);
    }

    #[test]
    fn test_env_override_timeouts() {
        let config = SwitchyardConfig::default().with_overrides_from(vars(&[
            ("SWITCHYARD_TIMEOUT_CLAUDE_CLI", "45"),
            ("SWITCHYARD_TIMEOUT_OLLAMA", "not-a-number"),
        ]));

        assert_eq!(
            config.dispatch.timeout_for("claude-cli"),
            Duration::from_secs(45)
        );
        assert_eq!(
            config.dispatch.timeout_for("ollama"),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_env_override_logging_and_storage() {
        let config = SwitchyardConfig::default().with_overrides_from(vars(&[
            ("SWITCHYARD_LOG_LEVEL", "debug"),
            ("SWITCHYARD_LOG_FORMAT", "xml"),
            ("SWITCHYARD_CACHE", "false"),
            ("SWITCHYARD_CACHE_DIR", "/var/cache/switchyard"),
            ("SWITCHYARD_AUDIT_PATH", "/var/log/switchyard.jsonl"),
            ("UNRELATED", "ignored"),
        ]));

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.cache.enabled);
        assert_eq!(
            config.cache.dir,
            Some(PathBuf::from("/var/cache/switchyard"))
        );
        assert_eq!(
            config.audit.path,
            Some(PathBuf::from("/var/log/switchyard.jsonl"))
        );
    }

    #[test]
    fn test_validation_duplicate_backend_in_order() {
        let mut config = SwitchyardConfig::default();
        config.dispatch.default_order = vec!["ollama".to_string(), "ollama".to_string()];

        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::Validation { ref message, .. }) if message.contains("duplicate")
        ));
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut config = SwitchyardConfig::default();
        config.dispatch.timeouts.insert("ollama".to_string(), 0);

        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::Validation { ref field, .. }) if field == "dispatch.timeouts.ollama"
        ));
    }

    #[test]
    fn test_validation_zero_window() {
        let mut config = SwitchyardConfig::default();
        config.health.window_size = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_inverted_connectivity_ttls() {
        let mut config = SwitchyardConfig::default();
        config.connectivity.failure_ttl_seconds = 3600;

        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::Validation { ref field, .. }) if field.starts_with("connectivity")
        ));
    }

    #[test]
    fn test_validation_bad_log_level_from_env() {
        let config = SwitchyardConfig::default()
            .with_overrides_from(vars(&[("SWITCHYARD_LOG_LEVEL", "loud")]));

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "logging.level"
        ));
    }

    #[test]
    fn test_unreadable_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file
        let result = SwitchyardConfig::load(Some(dir.path()));
        match result {
            Err(ConfigError::Io { path, .. }) => assert_eq!(path, dir.path()),
            other => panic!("expected Io error, got {:?}", other),
        }
    }
}
