//! On-disk format of the connectivity cache.
//!
//! ```json
//! {
//!   "ollama": {"working": true, "timestamp": 1760000000.123},
//!   "__preferred__": {"chat": "ollama"}
//! }
//! ```

use super::{Change, ConnectivityRecord, ConnectivityState, PREFERRED_KEY};
use crate::storage::{self, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct StoredVerdict {
    working: bool,
    /// Unix seconds
    timestamp: f64,
}

fn to_unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

fn from_unix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis((seconds * 1000.0).round() as i64)
}

/// Read the persisted state. Missing or unreadable files yield an empty
/// state; individual malformed entries are skipped.
pub(super) fn load(path: &Path) -> ConnectivityState {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ConnectivityState::default();
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read connectivity cache, starting empty"
            );
            return ConnectivityState::default();
        }
    };

    let root: Map<String, Value> = match serde_json::from_str(&content) {
        Ok(root) => root,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Corrupt connectivity cache, starting empty"
            );
            return ConnectivityState::default();
        }
    };

    let mut state = ConnectivityState::default();
    for (key, value) in root {
        if key == PREFERRED_KEY {
            match serde_json::from_value::<HashMap<String, String>>(value) {
                Ok(preferred) => state.preferred = preferred,
                Err(e) => tracing::warn!(error = %e, "Ignoring malformed preferred endpoints"),
            }
            continue;
        }

        let record = serde_json::from_value::<StoredVerdict>(value)
            .ok()
            .and_then(|v| {
                from_unix_seconds(v.timestamp).map(|last_checked| ConnectivityRecord {
                    working: v.working,
                    last_checked,
                })
            });
        match record {
            Some(record) => {
                state.records.insert(key, record);
            }
            None => tracing::debug!(endpoint = %key, "Skipping malformed connectivity entry"),
        }
    }
    state
}

/// Re-read the file, apply `change` and write the result back.
///
/// Entries written by other caches sharing the file are kept.
pub(super) fn merge_and_save(path: &Path, change: &Change) -> Result<(), StorageError> {
    let mut current = load(path);
    current.apply(change);
    save(path, &current)
}

/// Write the full state, replacing the previous file.
fn save(path: &Path, state: &ConnectivityState) -> Result<(), StorageError> {
    let mut root = Map::new();
    for (endpoint, record) in &state.records {
        let verdict = StoredVerdict {
            working: record.working,
            timestamp: to_unix_seconds(record.last_checked),
        };
        let value = serde_json::to_value(verdict).map_err(|e| StorageError::serde(path, e))?;
        root.insert(endpoint.clone(), value);
    }
    if !state.preferred.is_empty() {
        let value =
            serde_json::to_value(&state.preferred).map_err(|e| StorageError::serde(path, e))?;
        root.insert(PREFERRED_KEY.to_string(), value);
    }

    let bytes = serde_json::to_vec_pretty(&root).map_err(|e| StorageError::serde(path, e))?;
    storage::write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_seconds_roundtrip_keeps_millis() {
        let at = DateTime::<Utc>::from_timestamp_millis(1_760_000_000_123).unwrap();
        assert_eq!(from_unix_seconds(to_unix_seconds(at)), Some(at));
    }

    #[test]
    fn non_finite_timestamp_rejected() {
        assert!(from_unix_seconds(f64::NAN).is_none());
        assert!(from_unix_seconds(f64::INFINITY).is_none());
    }

    #[test]
    fn load_skips_malformed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connectivity.json");
        std::fs::write(
            &path,
            r#"{
                "good": {"working": false, "timestamp": 1760000000.5},
                "bad": {"working": "yes"},
                "__preferred__": {"chat": "good"}
            }"#,
        )
        .unwrap();

        let state = load(&path);
        assert_eq!(state.records.len(), 1);
        assert!(!state.records["good"].working);
        assert_eq!(state.preferred.get("chat").map(String::as_str), Some("good"));
    }

    #[test]
    fn load_non_object_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connectivity.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let state = load(&path);
        assert!(state.records.is_empty());
        assert!(state.preferred.is_empty());
    }

    #[test]
    fn merge_keeps_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connectivity.json");
        std::fs::write(
            &path,
            r#"{"other": {"working": true, "timestamp": 1760000000.0}}"#,
        )
        .unwrap();

        let at = DateTime::<Utc>::from_timestamp(1_760_000_100, 0).unwrap();
        merge_and_save(
            &path,
            &Change::Record(
                "mine".to_string(),
                ConnectivityRecord {
                    working: false,
                    last_checked: at,
                },
            ),
        )
        .unwrap();
        merge_and_save(&path, &Change::Forget("absent".to_string())).unwrap();

        let state = load(&path);
        assert!(state.records["other"].working);
        assert_eq!(state.records["mine"].last_checked, at);
    }
}
