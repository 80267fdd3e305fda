//! # Metrics Types
//!
//! Serializable views of dispatch statistics.

use serde::Serialize;

/// Point-in-time copy of the dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Dispatches started
    pub requests: u64,
    /// Dispatches that ended without a backend result
    pub errors: u64,
    /// Backend invocations that hit their timeout
    pub timeouts: u64,
    /// Dispatches answered from either cache tier
    pub cache_hits: u64,
    /// Sum of winning backend latencies
    pub total_latency_ms: u64,
    /// Dispatches answered by a backend
    pub backend_successes: u64,
}

impl MetricsSnapshot {
    /// Mean latency of backend-served dispatches, 0 when there were none.
    pub fn average_latency_ms(&self) -> f64 {
        if self.backend_successes == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.backend_successes as f64
        }
    }
}
