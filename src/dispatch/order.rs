//! Backend ordering for a dispatch.
//!
//! Precedence: a per-request order override, then an explicitly configured
//! backend, then auto mode. Auto mode starts from the static order and lets
//! runtime signals reshape it:
//!
//! 1. backends with a fresh connectivity failure are skipped
//! 2. backends with a usable health signal, best success rate first
//! 3. backends never observed, in static order
//! 4. unhealthy backends, in static order, as a last resort

use crate::config::BackendMode;
use crate::connectivity::ConnectivityCache;
use crate::health::{HealthMonitor, HealthState};

/// How the candidate list for one dispatch is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Caller-supplied order, attempted as given
    Override(Vec<String>),
    /// Configured single backend
    Explicit(String),
    Auto,
}

impl Selection {
    /// Resolve the selection for a request. An empty override counts as
    /// no override.
    pub fn resolve(request_order: Option<&[String]>, mode: &BackendMode) -> Self {
        match (request_order, mode) {
            (Some(order), _) if !order.is_empty() => Selection::Override(order.to_vec()),
            (_, BackendMode::Explicit(name)) => Selection::Explicit(name.clone()),
            _ => Selection::Auto,
        }
    }

    /// Stable string folded into the request fingerprint so that responses
    /// produced under different selections are cached separately.
    pub fn discriminator(&self) -> String {
        match self {
            Selection::Override(order) => format!("order:{}", order.join(",")),
            Selection::Explicit(name) => format!("backend:{}", name),
            Selection::Auto => "auto".to_string(),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Selection::Auto)
    }
}

/// The configured default order restricted to registered backends, followed
/// by any registered backend it does not mention, in registration order.
pub fn static_order(default_order: &[String], registered: &[String]) -> Vec<String> {
    let mut order = Vec::with_capacity(registered.len());
    for name in default_order {
        if !registered.contains(name) {
            tracing::warn!(backend = %name, "Default order names an unregistered backend");
            continue;
        }
        if !order.contains(name) {
            order.push(name.clone());
        }
    }
    for name in registered {
        if !order.contains(name) {
            order.push(name.clone());
        }
    }
    order
}

/// Auto-mode ordering over `static_order`.
pub fn rank_auto(
    static_order: &[String],
    connectivity: &ConnectivityCache,
    health: &HealthMonitor,
) -> Vec<String> {
    let mut signalled: Vec<(&String, f64)> = Vec::new();
    let mut unobserved = Vec::new();
    let mut last_resort = Vec::new();

    for name in static_order {
        if !connectivity.available(name) {
            tracing::debug!(backend = %name, "Skipping backend with recent connectivity failure");
            continue;
        }
        match health.state(name) {
            HealthState::Unknown => unobserved.push(name),
            HealthState::Unhealthy => last_resort.push(name),
            HealthState::Healthy | HealthState::Degraded => {
                signalled.push((name, health.score(name)))
            }
        }
    }

    // Stable sort keeps static order among equal rates
    signalled.sort_by(|a, b| b.1.total_cmp(&a.1));

    signalled
        .into_iter()
        .map(|(name, _)| name)
        .chain(unobserved)
        .chain(last_resort)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthMonitorConfig;
    use std::time::Duration;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(HealthMonitorConfig::default())
    }

    fn record(health: &HealthMonitor, backend: &str, successes: usize, failures: usize) {
        for _ in 0..successes {
            health.record_success(backend, Duration::from_millis(10));
        }
        for _ in 0..failures {
            health.record_failure(backend, Duration::ZERO);
        }
    }

    #[test]
    fn test_selection_precedence() {
        let explicit = BackendMode::Explicit("openai".to_string());
        let order = names(&["ollama"]);

        assert_eq!(
            Selection::resolve(Some(order.as_slice()), &explicit),
            Selection::Override(order.clone())
        );
        assert_eq!(
            Selection::resolve(None, &explicit),
            Selection::Explicit("openai".to_string())
        );
        assert_eq!(Selection::resolve(None, &BackendMode::Auto), Selection::Auto);
        assert_eq!(Selection::resolve(Some(&[][..]), &BackendMode::Auto), Selection::Auto);
    }

    #[test]
    fn test_discriminators_differ() {
        let a = Selection::Auto.discriminator();
        let b = Selection::Explicit("ollama".to_string()).discriminator();
        let c = Selection::Override(names(&["ollama"])).discriminator();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_static_order_appends_unlisted_and_drops_unknown() {
        let order = static_order(
            &names(&["openai", "ghost", "ollama"]),
            &names(&["ollama", "claude-cli", "openai"]),
        );
        assert_eq!(order, names(&["openai", "ollama", "claude-cli"]));
    }

    #[test]
    fn test_static_order_empty_default_uses_registration() {
        let order = static_order(&[], &names(&["b", "a"]));
        assert_eq!(order, names(&["b", "a"]));
    }

    #[test]
    fn test_auto_without_signals_keeps_static_order() {
        let order = rank_auto(
            &names(&["a", "b", "c"]),
            &ConnectivityCache::in_memory(),
            &monitor(),
        );
        assert_eq!(order, names(&["a", "b", "c"]));
    }

    #[test]
    fn test_auto_skips_connectivity_failures() {
        let connectivity = ConnectivityCache::in_memory();
        connectivity.update("b", false);

        let order = rank_auto(&names(&["a", "b", "c"]), &connectivity, &monitor());
        assert_eq!(order, names(&["a", "c"]));
    }

    #[test]
    fn test_auto_ranks_signalled_then_unobserved_then_unhealthy() {
        let health = monitor();
        record(&health, "a", 1, 9); // unhealthy
        record(&health, "c", 6, 4); // degraded 0.6
        record(&health, "d", 10, 0); // healthy 1.0

        let order = rank_auto(
            &names(&["a", "b", "c", "d"]),
            &ConnectivityCache::in_memory(),
            &health,
        );
        assert_eq!(order, names(&["d", "c", "b", "a"]));
    }

    #[test]
    fn test_auto_equal_rates_keep_static_order() {
        let health = monitor();
        record(&health, "x", 5, 0);
        record(&health, "y", 5, 0);

        let order = rank_auto(&names(&["y", "x"]), &ConnectivityCache::in_memory(), &health);
        assert_eq!(order, names(&["y", "x"]));
    }
}
