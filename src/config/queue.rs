//! Request queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `enqueue` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail immediately with `QueueError::Full`
    #[default]
    Reject,
    /// Wait up to `max_wait_seconds` for space to free up
    Block,
}

/// Configuration for the bounded priority request queue.
///
/// # Example
///
/// ```toml
/// [queue]
/// enabled = true
/// max_size = 100
/// max_wait_seconds = 30
/// overflow = "block"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Whether request queuing is enabled.
    ///
    /// Default: true
    pub enabled: bool,

    /// Maximum number of queued requests.
    ///
    /// Default: 100
    /// When max_size is 0, queuing is disabled (equivalent to enabled=false).
    pub max_size: u32,

    /// Maximum time a request may sit in the queue, in seconds.
    ///
    /// Default: 30 seconds
    /// Also bounds how long a blocking `enqueue` waits for space.
    pub max_wait_seconds: u64,

    /// Behavior when the queue is full.
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 100,
            max_wait_seconds: 30,
            overflow: OverflowPolicy::Reject,
        }
    }
}

impl QueueConfig {
    /// Check if queuing is effectively enabled.
    ///
    /// Queuing is disabled if either enabled=false or max_size=0.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.max_size > 0
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_defaults() {
        let config = QueueConfig::default();
        assert!(config.is_enabled());
        assert_eq!(config.max_size, 100);
        assert_eq!(config.overflow, OverflowPolicy::Reject);
    }

    #[test]
    fn test_zero_size_disables_queue() {
        let config = QueueConfig {
            max_size: 0,
            ..Default::default()
        };
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_overflow_policy_toml() {
        let config: QueueConfig = toml::from_str(r#"overflow = "block""#).unwrap();
        assert_eq!(config.overflow, OverflowPolicy::Block);
        assert_eq!(config.max_wait_seconds, 30);
    }
}
