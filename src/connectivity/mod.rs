//! Endpoint connectivity cache.
//!
//! Remembers whether the last attempt against each endpoint worked. A
//! "working" verdict is trusted for a long time, a "failed" verdict only
//! briefly, so failures recover quickly while flaky-but-working endpoints are
//! not re-probed constantly. Endpoints never seen are always available.
//!
//! State is written to disk after every mutation. The file may be shared by
//! several caches, so each write re-reads it and applies only the entry that
//! changed. Persistence problems are logged and the cache continues in
//! memory.

mod store;


use crate::config::ConnectivityConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::RuntimeFlavor;

/// Reserved top-level key in the persisted file holding preferred endpoints.
pub const PREFERRED_KEY: &str = "__preferred__";

/// Last observed verdict for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectivityRecord {
    pub working: bool,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct ConnectivityState {
    records: HashMap<String, ConnectivityRecord>,
    preferred: HashMap<String, String>,
}

/// A single mutation, replayed onto the file's current contents.
#[derive(Debug, Clone)]
pub(crate) enum Change {
    Record(String, ConnectivityRecord),
    Forget(String),
    Preferred(String, String),
}

impl ConnectivityState {
    fn apply(&mut self, change: &Change) {
        match change {
            Change::Record(endpoint, record) => {
                self.records.insert(endpoint.clone(), *record);
            }
            Change::Forget(endpoint) => {
                self.records.remove(endpoint);
            }
            Change::Preferred(group, endpoint) => {
                self.preferred.insert(group.clone(), endpoint.clone());
            }
        }
    }
}

/// Thread-safe, optionally persisted endpoint availability cache.
pub struct ConnectivityCache {
    path: Option<PathBuf>,
    success_ttl: Duration,
    failure_ttl: Duration,
    state: Mutex<ConnectivityState>,
}

impl ConnectivityCache {
    /// Create a cache from configuration, loading any persisted state.
    pub fn new(config: &ConnectivityConfig) -> Self {
        let state = config
            .path
            .as_deref()
            .map(store::load)
            .unwrap_or_default();

        if let Some(path) = &config.path {
            tracing::debug!(
                path = %path.display(),
                endpoints = state.records.len(),
                "Loaded connectivity cache"
            );
        }

        Self {
            path: config.path.clone(),
            success_ttl: config.success_ttl(),
            failure_ttl: config.failure_ttl(),
            state: Mutex::new(state),
        }
    }

    /// A cache backed by `path` with default TTLs.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(&ConnectivityConfig {
            path: Some(path.into()),
            ..Default::default()
        })
    }

    /// A cache that is never persisted.
    pub fn in_memory() -> Self {
        Self::new(&ConnectivityConfig::default())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectivityState> {
        // A poisoned lock only means a panic mid-update; the maps are still valid.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether the endpoint should be attempted now.
    pub fn available(&self, endpoint: &str) -> bool {
        self.available_at(endpoint, Utc::now())
    }

    /// Whether the endpoint should be attempted at `now`.
    ///
    /// Returns the last verdict while it is fresh, otherwise `true`.
    pub fn available_at(&self, endpoint: &str, now: DateTime<Utc>) -> bool {
        let state = self.lock();
        let Some(record) = state.records.get(endpoint) else {
            return true;
        };

        let elapsed = (now - record.last_checked).to_std().unwrap_or(Duration::ZERO);
        let threshold = if record.working {
            self.success_ttl
        } else {
            self.failure_ttl
        };

        if elapsed < threshold {
            record.working
        } else {
            true
        }
    }

    /// Record the outcome of an attempt against an endpoint.
    pub fn update(&self, endpoint: &str, working: bool) {
        self.update_at(endpoint, working, Utc::now());
    }

    /// Record an outcome observed at `now`.
    ///
    /// The stored timestamp never moves backwards for an endpoint.
    pub fn update_at(&self, endpoint: &str, working: bool, now: DateTime<Utc>) {
        if endpoint == PREFERRED_KEY {
            tracing::warn!(endpoint, "Refusing to record reserved endpoint name");
            return;
        }

        let mut state = self.lock();
        let previous = state.records.get(endpoint).copied();
        let last_checked = match previous {
            Some(prev) if prev.last_checked > now => prev.last_checked,
            _ => now,
        };
        let change = Change::Record(
            endpoint.to_string(),
            ConnectivityRecord {
                working,
                last_checked,
            },
        );
        state.apply(&change);

        if previous.map(|p| p.working) != Some(working) {
            tracing::info!(endpoint, working, "Endpoint connectivity changed");
        }

        self.persist(&change);
    }

    /// Last record for an endpoint, if any.
    pub fn record(&self, endpoint: &str) -> Option<ConnectivityRecord> {
        self.lock().records.get(endpoint).copied()
    }

    /// All records, sorted by endpoint.
    pub fn records(&self) -> Vec<(String, ConnectivityRecord)> {
        let state = self.lock();
        let mut records: Vec<_> = state
            .records
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    /// Drop an endpoint's record so it is treated as never seen.
    pub fn forget(&self, endpoint: &str) {
        let mut state = self.lock();
        if state.records.remove(endpoint).is_some() {
            self.persist(&Change::Forget(endpoint.to_string()));
        }
    }

    /// Preferred endpoint for a group, e.g. the last backend that worked
    /// for a kind of task.
    pub fn preferred(&self, group: &str) -> Option<String> {
        self.lock().preferred.get(group).cloned()
    }

    pub fn set_preferred(&self, group: &str, endpoint: &str) {
        let change = Change::Preferred(group.to_string(), endpoint.to_string());
        let mut state = self.lock();
        state.apply(&change);
        self.persist(&change);
    }

    /// Replay `change` onto the file's current contents and write it back.
    ///
    /// Callers hold the state lock, so writers within one cache serialize.
    /// The write is synchronous; on a multi-threaded Tokio runtime it runs
    /// under `block_in_place` so other tasks move off this worker.
    fn persist(&self, change: &Change) {
        let Some(path) = &self.path else {
            return;
        };

        let write = || store::merge_and_save(path, change);
        let result = match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(write)
            }
            _ => write(),
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist connectivity cache");
        }
    }
}
