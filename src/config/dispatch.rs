//! Dispatch cascade configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Backend selection mode.
///
/// Serialized as a plain string: `"auto"` or the name of a single backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BackendMode {
    /// Health- and connectivity-informed cascade over the default order
    #[default]
    Auto,
    /// Always use the named backend
    Explicit(String),
}

impl From<String> for BackendMode {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            BackendMode::Auto
        } else {
            BackendMode::Explicit(trimmed.to_string())
        }
    }
}

impl FromStr for BackendMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BackendMode::from(s.to_string()))
    }
}

impl From<BackendMode> for String {
    fn from(mode: BackendMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Auto => f.write_str("auto"),
            BackendMode::Explicit(name) => f.write_str(name),
        }
    }
}

/// Configuration for the dispatch cascade.
///
/// # Example
///
/// ```toml
/// [dispatch]
/// backend = "auto"
/// default_order = ["ollama", "claude-cli", "openai"]
/// default_timeout_seconds = 120
///
/// [dispatch.timeouts]
/// ollama = 300
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// `"auto"` or an explicit backend name.
    pub backend: BackendMode,

    /// Static fallback ordering used in auto mode.
    ///
    /// Registered backends missing from this list are appended in
    /// registration order.
    pub default_order: Vec<String>,

    /// Timeout applied to a backend invocation with no specific override.
    pub default_timeout_seconds: u64,

    /// How long a duplicate caller waits for the in-flight owner before
    /// issuing its own call.
    pub dedup_wait_seconds: u64,

    /// Per-backend timeout overrides in seconds.
    pub timeouts: HashMap<String, u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backend: BackendMode::Auto,
            default_order: Vec::new(),
            default_timeout_seconds: 120,
            dedup_wait_seconds: 300,
            timeouts: HashMap::new(),
        }
    }
}

impl DispatchConfig {
    /// Timeout for a backend, honoring per-backend overrides.
    ///
    /// Overrides match either the exact name or the env-style form
    /// (lowercase, `-` replaced with `_`).
    pub fn timeout_for(&self, backend: &str) -> Duration {
        let seconds = self
            .timeouts
            .get(backend)
            .or_else(|| self.timeouts.get(&env_key(backend)))
            .copied()
            .unwrap_or(self.default_timeout_seconds);
        Duration::from_secs(seconds)
    }

    pub fn dedup_wait(&self) -> Duration {
        Duration::from_secs(self.dedup_wait_seconds)
    }
}

/// Normalize a backend name to the suffix used by `SWITCHYARD_TIMEOUT_*`.
pub(crate) fn env_key(backend: &str) -> String {
    backend.to_ascii_lowercase().replace('-', "_")
}
