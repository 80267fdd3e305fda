//! Response cache configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the two-tier response cache.
///
/// # Example
///
/// ```toml
/// [cache]
/// enabled = true
/// dir = ".switchyard/cache"
/// ttl_seconds = 604800
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether dispatch results are cached at all.
    pub enabled: bool,

    /// Directory for the persistent tier. `None` disables the persistent
    /// tier; the in-memory tier is still used.
    pub dir: Option<PathBuf>,

    /// Lifetime of persistent entries, enforced at read time.
    ///
    /// Default: 7 days
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl_seconds: 7 * 24 * 60 * 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}
