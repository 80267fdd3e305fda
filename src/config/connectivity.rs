//! Connectivity cache configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the persisted endpoint connectivity cache.
///
/// A "working" verdict is trusted for `success_ttl_seconds`, a "failed"
/// verdict only for `failure_ttl_seconds`; after that the endpoint is
/// optimistically retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// JSON file the cache is persisted to. `None` keeps it in memory only.
    pub path: Option<PathBuf>,
    pub success_ttl_seconds: u64,
    pub failure_ttl_seconds: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            path: None,
            success_ttl_seconds: 15 * 60,
            failure_ttl_seconds: 2 * 60,
        }
    }
}

impl ConnectivityConfig {
    pub fn success_ttl(&self) -> Duration {
        Duration::from_secs(self.success_ttl_seconds)
    }

    pub fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_ttl_seconds)
    }
}
