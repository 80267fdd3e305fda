//! Request deduplication.
//!
//! When several callers issue identical content concurrently, the first one
//! becomes the owner and performs the upstream call; the rest wait on the
//! owner's completion signal and receive a clone of its result.
//!
//! Per fingerprint an entry moves `absent → pending → resolved → evicted`.
//! Pending entries are evicted after a TTL so a crashed or hung owner cannot
//! stall waiters forever; resolved entries linger briefly so late waiters
//! still see the result.
//!
//! Each claim gets a generation number. An owner that outlives its pending
//! TTL loses the entry to the next claimant, and its late
//! [`complete_owned`](Deduplicator::complete_owned) or
//! [`discard_owned`](Deduplicator::discard_owned) no longer touches it.

use crate::config::DedupConfig;
use crate::fingerprint::Fingerprint;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct DedupEntry<R> {
    generation: u64,
    owner_started_at: Instant,
    resolved_at: Option<Instant>,
    /// `None` while pending
    tx: watch::Sender<Option<R>>,
}

impl<R> DedupEntry<R> {
    fn pending(generation: u64, now: Instant) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            generation,
            owner_started_at: now,
            resolved_at: None,
            tx,
        }
    }

    fn is_expired(&self, now: Instant, pending_ttl: Duration, result_ttl: Duration) -> bool {
        match self.resolved_at {
            Some(resolved_at) => now.saturating_duration_since(resolved_at) >= result_ttl,
            None => now.saturating_duration_since(self.owner_started_at) >= pending_ttl,
        }
    }
}

#[derive(Debug, Default)]
struct DedupCounters {
    owners: AtomicU64,
    waiters: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time deduplication statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    /// Calls that became owners
    pub owners: u64,
    /// Calls that found an entry already present
    pub waiters: u64,
    /// Entries removed by TTL sweeps
    pub evictions: u64,
}

/// Collapses concurrent identical requests into one upstream call.
pub struct Deduplicator<R> {
    entries: DashMap<Fingerprint, DedupEntry<R>>,
    pending_ttl: Duration,
    result_ttl: Duration,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
    next_generation: AtomicU64,
    counters: DedupCounters,
}

impl<R: Clone + Send + Sync + 'static> Deduplicator<R> {
    pub fn new(config: &DedupConfig) -> Self {
        Self::with_ttls(
            config.pending_ttl(),
            config.result_ttl(),
            config.sweep_interval(),
        )
    }

    pub fn with_ttls(pending_ttl: Duration, result_ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            pending_ttl,
            result_ttl,
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
            next_generation: AtomicU64::new(1),
            counters: DedupCounters::default(),
        }
    }

    /// Deterministic key for a piece of content.
    pub fn fingerprint(&self, content: &str) -> Fingerprint {
        Fingerprint::of(content)
    }

    /// Returns false if the caller is now the owner of `content` and must
    /// eventually call [`store_result`](Self::store_result); true if another
    /// caller already owns it and this one should wait.
    pub fn is_duplicate(&self, content: &str) -> bool {
        self.is_duplicate_key(&Fingerprint::of(content))
    }

    pub fn is_duplicate_key(&self, key: &Fingerprint) -> bool {
        self.claim_key(key).is_none()
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Try to become the owner of `key`.
    ///
    /// Returns the generation of the new pending entry when the caller is
    /// the owner, `None` when a live entry already exists.
    pub fn claim_key(&self, key: &Fingerprint) -> Option<u64> {
        self.maybe_sweep();
        let now = Instant::now();

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied
                    .get()
                    .is_expired(now, self.pending_ttl, self.result_ttl)
                {
                    let generation = self.next_generation();
                    // Dropping the old sender releases anyone still waiting on it
                    occupied.insert(DedupEntry::pending(generation, now));
                    self.counters.owners.fetch_add(1, Ordering::Relaxed);
                    Some(generation)
                } else {
                    self.counters.waiters.fetch_add(1, Ordering::Relaxed);
                    None
                }
            }
            Entry::Vacant(vacant) => {
                let generation = self.next_generation();
                vacant.insert(DedupEntry::pending(generation, now));
                self.counters.owners.fetch_add(1, Ordering::Relaxed);
                Some(generation)
            }
        }
    }

    /// Wait up to `timeout` for the owner's result.
    ///
    /// Returns `None` on timeout, when no entry exists, or when the entry was
    /// evicted while waiting. Never modifies the entry.
    pub async fn wait_for_result(&self, content: &str, timeout: Duration) -> Option<R> {
        self.wait_for_result_key(&Fingerprint::of(content), timeout)
            .await
    }

    pub async fn wait_for_result_key(&self, key: &Fingerprint, timeout: Duration) -> Option<R> {
        let mut rx = {
            let entry = self.entries.get(key)?;
            entry.tx.subscribe()
        };

        let outcome = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(value)) => value.clone(),
            Ok(Err(_)) => {
                tracing::debug!(fingerprint = key.short(), "Dedup entry evicted while waiting");
                None
            }
            Err(_) => {
                tracing::debug!(
                    fingerprint = key.short(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for in-flight result"
                );
                None
            }
        };
        outcome
    }

    /// Publish the result for `content` and release all waiters.
    pub fn store_result(&self, content: &str, result: R) {
        self.store_result_key(&Fingerprint::of(content), result);
    }

    /// Publish a result. An entry resolves once; later results for the same
    /// live entry are ignored.
    pub fn store_result_key(&self, key: &Fingerprint, result: R) {
        let now = Instant::now();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.resolved_at.is_some() {
                    tracing::debug!(fingerprint = key.short(), "Entry already resolved");
                    return;
                }
                entry.tx.send_replace(Some(result));
                entry.resolved_at = Some(now);
            }
            Entry::Vacant(vacant) => {
                // Owner outlived its pending TTL; keep the result for late waiters
                vacant.insert(self.resolved(result, now));
            }
        }
    }

    fn resolved(&self, result: R, now: Instant) -> DedupEntry<R> {
        let (tx, _) = watch::channel(Some(result));
        DedupEntry {
            generation: self.next_generation(),
            owner_started_at: now,
            resolved_at: Some(now),
            tx,
        }
    }

    /// Publish the result of the claim identified by `generation`.
    ///
    /// Ignored when the entry has since been reclaimed by another owner.
    /// Returns whether the result was published.
    pub fn complete_owned(&self, key: &Fingerprint, generation: u64, result: R) -> bool {
        let now = Instant::now();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.generation != generation {
                    tracing::debug!(
                        fingerprint = key.short(),
                        generation,
                        current = entry.generation,
                        "Ignoring result from superseded owner"
                    );
                    return false;
                }
                if entry.resolved_at.is_some() {
                    return false;
                }
                entry.tx.send_replace(Some(result));
                entry.resolved_at = Some(now);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.resolved(result, now));
                true
            }
        }
    }

    /// Remove the entry only if it still belongs to the claim identified by
    /// `generation`.
    pub fn discard_owned(&self, key: &Fingerprint, generation: u64) {
        self.entries
            .remove_if(key, |_, entry| entry.generation == generation);
    }

    /// Remove the entry for `content`, waking waiters with `None`.
    pub fn discard(&self, content: &str) {
        self.discard_key(&Fingerprint::of(content));
    }

    pub fn discard_key(&self, key: &Fingerprint) {
        self.entries.remove(key);
    }

    /// Whether the entry for `key` exists and is still pending.
    pub fn is_pending(&self, key: &Fingerprint) -> bool {
        self.entries
            .get(key)
            .map(|e| e.resolved_at.is_none())
            .unwrap_or(false)
    }

    /// Number of tracked entries (pending and resolved).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(now, self.pending_ttl, self.result_ttl));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.counters
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!(removed, remaining = self.entries.len(), "Swept dedup entries");
        }
        removed
    }

    /// Sweep inline when the last sweep is older than the sweep interval.
    fn maybe_sweep(&self) {
        let due = match self.last_sweep.try_lock() {
            Ok(mut last) if last.elapsed() >= self.sweep_interval => {
                *last = Instant::now();
                true
            }
            _ => false,
        };
        if due {
            self.sweep();
        }
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            owners: self.counters.owners.load(Ordering::Relaxed),
            waiters: self.counters.waiters.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Start a background task sweeping expired entries every sweep interval.
    pub fn spawn_sweeper(self: Arc<Self>, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.sweep_interval.max(Duration::from_millis(10));
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::debug!("Dedup sweeper shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        self.sweep();
                    }
                }
            }
        })
    }
}
