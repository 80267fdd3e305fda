//! Persistent tier: `<dir>/<fingerprint>.json` holding `{stored_at, value}`.

use super::CacheEntry;
use crate::fingerprint::Fingerprint;
use crate::storage::{self, StorageError};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn entry_path(dir: &Path, key: &Fingerprint) -> PathBuf {
    dir.join(format!("{}.json", key.as_str()))
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}

/// Read a live entry. Expired and corrupt files are removed.
pub(super) async fn read(dir: &Path, key: &Fingerprint, ttl: Duration) -> Option<CacheEntry> {
    let path = entry_path(dir, key);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read cache file");
            return None;
        }
    };

    let entry: CacheEntry = match serde_json::from_slice(&bytes) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Removing corrupt cache file");
            remove_quietly(&path).await;
            return None;
        }
    };

    if entry.is_expired(Utc::now(), ttl) {
        tracing::debug!(fingerprint = key.short(), "Persistent cache entry expired");
        remove_quietly(&path).await;
        return None;
    }
    Some(entry)
}

pub(super) async fn write(
    dir: &Path,
    key: &Fingerprint,
    entry: &CacheEntry,
) -> Result<(), StorageError> {
    let path = entry_path(dir, key);
    let bytes = serde_json::to_vec(entry).map_err(|e| StorageError::serde(&path, e))?;
    storage::write_atomic_async(&path, &bytes).await
}

/// Sweep the directory, removing expired and unreadable `.json` files.
pub(super) async fn prune(dir: &Path, ttl: Duration, now: DateTime<Utc>) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to list cache directory");
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let dir_entry = match entries.next_entry().await {
            Ok(Some(dir_entry)) => dir_entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Cache directory scan aborted");
                break;
            }
        };

        let path = dir_entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        let stale = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<CacheEntry>(&bytes)
                .map(|entry| entry.is_expired(now, ttl))
                .unwrap_or(true),
            Err(_) => continue,
        };
        if stale && tokio::fs::remove_file(&path).await.is_ok() {
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::info!(dir = %dir.display(), removed, "Pruned persistent cache");
    }
    removed
}
