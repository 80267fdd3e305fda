//! Two-tier response cache.
//!
//! The memory tier is a concurrent map that lives for the process lifetime.
//! The persistent tier is a directory with one JSON file per fingerprint;
//! its entries expire after a TTL checked at read time and are promoted into
//! memory when hit.
//!
//! Storage failures never surface to callers: they are logged and the cache
//! behaves as if the persistent tier were absent.

mod disk;

use crate::config::CacheConfig;
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A cached backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: String,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            stored_at: Utc::now(),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = (now - self.stored_at).to_std().unwrap_or(Duration::ZERO);
        age >= ttl
    }
}

/// Which tier served a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Memory,
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub value: String,
    pub tier: CacheTier,
}

pub struct ResponseCache {
    enabled: bool,
    memory: DashMap<Fingerprint, CacheEntry>,
    dir: Option<PathBuf>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            memory: DashMap::new(),
            dir: config.dir.clone(),
            ttl: config.ttl(),
        }
    }

    /// Memory-only cache.
    pub fn in_memory() -> Self {
        Self::new(&CacheConfig {
            dir: None,
            ..Default::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Look up a response, memory first.
    pub async fn get(&self, key: &Fingerprint) -> Option<CacheHit> {
        if !self.enabled {
            return None;
        }

        if let Some(entry) = self.memory.get(key) {
            return Some(CacheHit {
                value: entry.value.clone(),
                tier: CacheTier::Memory,
            });
        }

        let dir = self.dir.as_deref()?;
        let entry = disk::read(dir, key, self.ttl).await?;
        tracing::debug!(fingerprint = key.short(), "Promoting persistent cache hit");
        let value = entry.value.clone();
        self.memory.insert(key.clone(), entry);

        Some(CacheHit {
            value,
            tier: CacheTier::Persistent,
        })
    }

    /// Store a response in both tiers.
    pub async fn put(&self, key: &Fingerprint, value: impl Into<String>) {
        if !self.enabled {
            return;
        }

        let entry = CacheEntry::new(value);
        if let Some(dir) = &self.dir {
            if let Err(e) = disk::write(dir, key, &entry).await {
                tracing::warn!(
                    fingerprint = key.short(),
                    error = %e,
                    "Failed to write persistent cache entry"
                );
            }
        }
        self.memory.insert(key.clone(), entry);
    }

    /// Remove expired or unreadable files from the persistent tier.
    /// Returns the number of files removed.
    pub async fn prune(&self) -> usize {
        match &self.dir {
            Some(dir) => disk::prune(dir, self.ttl, Utc::now()).await,
            None => 0,
        }
    }

    /// Empty the memory tier.
    pub fn clear(&self) {
        self.memory.clear();
    }

    /// Number of entries in the memory tier.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}
