//! # Dispatch Metrics
//!
//! In-process counters for the dispatch cascade, mirrored to the `metrics`
//! facade so an installed recorder (see [`setup_metrics`]) can export them.
//!
//! ## Metrics Emitted
//!
//! **Counters:**
//! - `switchyard_requests_total` - Dispatches started
//! - `switchyard_cache_hits_total{tier}` - Cache hits by tier
//! - `switchyard_dedup_hits_total` - Dispatches served by an in-flight owner
//! - `switchyard_backend_timeouts_total{backend}` - Backend invocation timeouts
//! - `switchyard_backend_failures_total{backend}` - Failed backend invocations
//! - `switchyard_dispatch_errors_total` - Dispatches without a backend result
//!
//! **Histograms:**
//! - `switchyard_backend_latency_seconds{backend}` - Winning backend latency
//!
//! **Gauges:**
//! - `switchyard_queue_depth` - Items waiting in the request queue
//! - `switchyard_backend_success_rate{backend}` - Windowed success rate

pub mod types;

pub use types::MetricsSnapshot;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    requests: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    cache_hits: AtomicU64,
    total_latency_ms: AtomicU64,
    backend_successes: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("switchyard_requests_total").increment(1);
    }

    pub fn record_cache_hit(&self, tier: &'static str) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("switchyard_cache_hits_total", "tier" => tier).increment(1);
    }

    pub fn record_dedup_hit(&self) {
        metrics::counter!("switchyard_dedup_hits_total").increment(1);
    }

    /// A backend produced the dispatch result.
    pub fn record_success(&self, backend: &str, latency: Duration) {
        self.backend_successes.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        metrics::histogram!(
            "switchyard_backend_latency_seconds",
            "backend" => backend.to_string()
        )
        .record(latency.as_secs_f64());
    }

    pub fn record_backend_failure(&self, backend: &str) {
        metrics::counter!(
            "switchyard_backend_failures_total",
            "backend" => backend.to_string()
        )
        .increment(1);
    }

    pub fn record_timeout(&self, backend: &str) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "switchyard_backend_timeouts_total",
            "backend" => backend.to_string()
        )
        .increment(1);
    }

    /// The dispatch ended without any backend result.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("switchyard_dispatch_errors_total").increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            total_latency_ms: self.total_latency_ms.load(Ordering::Relaxed),
            backend_successes: self.backend_successes.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter. Facade metrics are owned by the recorder and are
    /// left untouched.
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.total_latency_ms.store(0, Ordering::Relaxed);
        self.backend_successes.store(0, Ordering::Relaxed);
    }
}

/// Install a global Prometheus recorder with latency buckets sized for
/// model backends (seconds).
///
/// Returns the handle used to render the text exposition format.
/// Must be called from within a Tokio runtime.
pub fn setup_metrics() -> Result<
    metrics_exporter_prometheus::PrometheusHandle,
    metrics_exporter_prometheus::BuildError,
> {
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

    let latency_buckets = &[
        0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    ];

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("switchyard_backend_latency_seconds".to_string()),
            latency_buckets,
        )?
        .install_recorder()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_counters_accumulate() {
        let m = DispatchMetrics::new();
        m.record_request();
        m.record_request();
        m.record_cache_hit("memory");
        m.record_success("ollama", Duration::from_millis(250));
        m.record_timeout("claude-cli");
        m.record_error();

        let snapshot = m.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.total_latency_ms, 250);
        assert_eq!(snapshot.backend_successes, 1);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let m = DispatchMetrics::new();
        m.record_request();
        m.record_success("ollama", Duration::from_millis(10));
        m.reset();

        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_facade_metrics_reach_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let m = DispatchMetrics::new();

        metrics::with_local_recorder(&recorder, || {
            m.record_request();
            m.record_timeout("ollama");
            m.record_success("ollama", Duration::from_millis(120));
        });

        let rendered = handle.render();
        assert!(rendered.contains("switchyard_requests_total"));
        assert!(rendered.contains("switchyard_backend_timeouts_total"));
        assert!(rendered.contains("backend=\"ollama\""));
    }
}
