//! Request deduplication configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the request deduplicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Pending entries older than this are evicted so waiters are released
    /// even when the owner never publishes a result.
    pub pending_ttl_seconds: u64,

    /// How long a resolved result stays available to late waiters.
    pub result_ttl_seconds: u64,

    /// Minimum spacing between sweeps of expired entries.
    pub sweep_interval_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            pending_ttl_seconds: 300,
            result_ttl_seconds: 30,
            sweep_interval_seconds: 30,
        }
    }
}

impl DedupConfig {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_seconds)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}
