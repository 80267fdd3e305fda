//! Configuration for health monitoring.

use serde::{Deserialize, Serialize};

/// Configuration for sliding-window backend health monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthMonitorConfig {
    /// Number of most recent outcomes kept per backend
    pub window_size: usize,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self { window_size: 100 }
    }
}
