//! Per-backend health window and its derived classification.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Success rate at or above which a backend is healthy.
pub const HEALTHY_THRESHOLD: f64 = 0.8;

/// Success rate at or above which a backend is degraded rather than unhealthy.
pub const DEGRADED_THRESHOLD: f64 = 0.5;

/// Score given to a backend with no observations when ranking candidates.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Coarse health classification of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// No observations yet
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    /// Classify a success rate over a window of `samples` outcomes.
    pub fn classify(success_rate: f64, samples: usize) -> Self {
        if samples == 0 {
            HealthState::Unknown
        } else if success_rate >= HEALTHY_THRESHOLD {
            HealthState::Healthy
        } else if success_rate >= DEGRADED_THRESHOLD {
            HealthState::Degraded
        } else {
            HealthState::Unhealthy
        }
    }

    /// Whether a backend in this state may be selected.
    ///
    /// Unknown backends are never blocked.
    pub fn is_usable(self) -> bool {
        !matches!(self, HealthState::Unhealthy)
    }
}

/// A single backend invocation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub latency: Duration,
}

/// Sliding window of recent outcomes for one backend.
#[derive(Debug, Clone, Serialize)]
pub struct HealthRecord {
    /// Backend identifier
    pub backend_id: String,
    /// Fraction of successful outcomes in the window (0.0 when empty)
    pub success_rate: f64,
    /// Mean latency over the window
    #[serde(serialize_with = "serialize_millis")]
    pub avg_latency: Duration,
    /// Classification derived from the window
    pub state: HealthState,
    /// Lifetime success count (not bounded by the window)
    pub total_successes: u64,
    /// Lifetime failure count (not bounded by the window)
    pub total_failures: u64,
    /// When the last outcome was recorded
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip)]
    outcomes: VecDeque<Outcome>,
    #[serde(skip)]
    window_size: usize,
}

impl HealthRecord {
    /// Create an empty record for a backend.
    pub fn new(backend_id: impl Into<String>, window_size: usize) -> Self {
        Self {
            backend_id: backend_id.into(),
            success_rate: 0.0,
            avg_latency: Duration::ZERO,
            state: HealthState::Unknown,
            total_successes: 0,
            total_failures: 0,
            last_updated: None,
            outcomes: VecDeque::with_capacity(window_size.min(1024)),
            window_size: window_size.max(1),
        }
    }

    /// Append an outcome, evict the oldest beyond the window and recompute.
    ///
    /// Returns the previous state so callers can detect transitions.
    pub fn push(&mut self, outcome: Outcome) -> HealthState {
        let previous = self.state;

        if outcome.success {
            self.total_successes += 1;
        } else {
            self.total_failures += 1;
        }

        self.outcomes.push_back(outcome);
        while self.outcomes.len() > self.window_size {
            self.outcomes.pop_front();
        }
        self.last_updated = Some(Utc::now());
        self.recompute();

        previous
    }

    fn recompute(&mut self) {
        let samples = self.outcomes.len();
        if samples == 0 {
            self.success_rate = 0.0;
            self.avg_latency = Duration::ZERO;
        } else {
            let successes = self.outcomes.iter().filter(|o| o.success).count();
            let total_latency: Duration = self.outcomes.iter().map(|o| o.latency).sum();
            self.success_rate = successes as f64 / samples as f64;
            self.avg_latency = total_latency / samples as u32;
        }
        self.state = HealthState::classify(self.success_rate, samples);
    }

    /// Outcomes currently in the window, oldest first.
    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter()
    }

    /// Number of outcomes in the window.
    pub fn samples(&self) -> usize {
        self.outcomes.len()
    }

    /// Failures within the current window.
    pub fn window_failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    /// Ranking score: the success rate, or neutral when nothing was observed.
    pub fn score(&self) -> f64 {
        if self.outcomes.is_empty() {
            NEUTRAL_SCORE
        } else {
            self.success_rate
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state.is_usable()
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
