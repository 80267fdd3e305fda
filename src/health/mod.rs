//! Health monitoring module for backend outcome tracking.
//!
//! Every backend invocation is recorded as a success or failure with its
//! latency. The most recent outcomes per backend form a sliding window from
//! which a coarse [`HealthState`] is derived on each update; older history
//! has no influence.

mod config;
mod state;


pub use config::*;
pub use state::*;

use dashmap::DashMap;
use std::time::Duration;

/// Thread-safe per-backend health windows.
pub struct HealthMonitor {
    config: HealthMonitorConfig,
    records: DashMap<String, HealthRecord>,
}

impl HealthMonitor {
    pub fn new(config: HealthMonitorConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
        }
    }

    /// Record a successful invocation.
    pub fn record_success(&self, backend: &str, latency: Duration) {
        self.record(
            backend,
            Outcome {
                success: true,
                latency,
            },
        );
    }

    /// Record a failed invocation. Pass `Duration::ZERO` when no latency
    /// was measured.
    pub fn record_failure(&self, backend: &str, latency: Duration) {
        self.record(
            backend,
            Outcome {
                success: false,
                latency,
            },
        );
    }

    fn record(&self, backend: &str, outcome: Outcome) {
        let mut record = self
            .records
            .entry(backend.to_string())
            .or_insert_with(|| HealthRecord::new(backend, self.config.window_size));

        let previous = record.push(outcome);

        metrics::gauge!("switchyard_backend_success_rate", "backend" => backend.to_string())
            .set(record.success_rate);

        if previous != record.state {
            tracing::info!(
                backend = backend,
                old_state = ?previous,
                new_state = ?record.state,
                success_rate = record.success_rate,
                "Backend health changed"
            );
        }
    }

    /// Whether the backend may be selected. Unseen backends are healthy.
    pub fn is_healthy(&self, backend: &str) -> bool {
        self.records
            .get(backend)
            .map(|r| r.is_healthy())
            .unwrap_or(true)
    }

    /// Current record for a backend; an empty `Unknown` record if unseen.
    pub fn status(&self, backend: &str) -> HealthRecord {
        self.records
            .get(backend)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| HealthRecord::new(backend, self.config.window_size))
    }

    /// Current classification for a backend.
    pub fn state(&self, backend: &str) -> HealthState {
        self.records
            .get(backend)
            .map(|r| r.state)
            .unwrap_or(HealthState::Unknown)
    }

    /// Ranking score for a backend: its window success rate, or
    /// [`NEUTRAL_SCORE`] if it has not been observed.
    pub fn score(&self, backend: &str) -> f64 {
        self.records
            .get(backend)
            .map(|r| r.score())
            .unwrap_or(NEUTRAL_SCORE)
    }

    /// Pick the candidate with the highest score.
    ///
    /// Ties go to the candidate listed first. Returns `None` for an empty list.
    pub fn healthiest<S: AsRef<str>>(&self, candidates: &[S]) -> Option<String> {
        let mut best: Option<(&str, f64)> = None;
        for candidate in candidates {
            let name = candidate.as_ref();
            let score = self.score(name);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((name, score)),
            }
        }
        best.map(|(name, _)| name.to_string())
    }

    /// Forget everything recorded for a backend.
    pub fn reset(&self, backend: &str) {
        self.records.remove(backend);
    }

    /// Records for every observed backend, sorted by backend id.
    pub fn snapshot(&self) -> Vec<HealthRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.backend_id.cmp(&b.backend_id));
        records
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthMonitorConfig::default())
    }
}
