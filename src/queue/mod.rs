//! Request queue for serialized, prioritized dispatch
//!
//! Bounded priority queue. Higher priority items are dequeued first; equal
//! priorities are served in admission order. A full queue either rejects new
//! items or makes the caller wait for space, depending on configuration.

use crate::config::{OverflowPolicy, QueueConfig};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{oneshot, Notify};

/// Identifier assigned to an item on admission.
pub type ItemId = u64;

/// One-shot channel used to hand an item's result back to whoever queued it.
pub type Completion<R> = oneshot::Sender<R>;

/// An item waiting in (or just removed from) the queue.
pub struct QueuedItem<T, R = ()> {
    pub id: ItemId,
    pub priority: i32,
    pub enqueued_at: Instant,
    pub payload: T,
    /// Completion callback supplied at admission
    pub completion: Option<Completion<R>>,
}

impl<T, R> QueuedItem<T, R> {
    /// Deliver a result to the submitter.
    ///
    /// Returns false if there was no callback or the submitter stopped
    /// listening.
    pub fn complete(&mut self, result: R) -> bool {
        match self.completion.take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

impl<T, R> std::fmt::Debug for QueuedItem<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedItem")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}

/// Read-only view of a pending item returned by [`RequestQueue::peek`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem<T> {
    pub id: ItemId,
    pub priority: i32,
    pub enqueued_at: Instant,
    pub payload: T,
}

/// Errors from queue operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Queue is full (total depth == max_size)
    #[error("Queue is full ({max_size} requests)")]
    Full { max_size: u32 },

    /// Queue is disabled
    #[error("Request queuing is disabled")]
    Disabled,
}

/// Heap ordering key: higher priority, then earlier admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapKey {
    priority: i32,
    enqueued_at: Instant,
    id: ItemId,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct QueueInner<T, R> {
    heap: BinaryHeap<HeapKey>,
    items: HashMap<ItemId, QueuedItem<T, R>>,
}

/// Bounded, thread-safe priority queue.
///
/// The heap and the id index are only ever touched together under one lock.
pub struct RequestQueue<T, R = ()> {
    inner: Mutex<QueueInner<T, R>>,
    next_id: AtomicU64,
    item_ready: Notify,
    space_ready: Notify,
    config: QueueConfig,
}

impl<T, R> RequestQueue<T, R> {
    /// Create a new RequestQueue from configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::with_capacity(config.max_size.min(1024) as usize),
                items: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
            item_ready: Notify::new(),
            space_ready: Notify::new(),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<T, R>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check capacity and insert under one lock, handing the payload back
    /// when the queue is full.
    fn admit(
        &self,
        payload: T,
        priority: i32,
        completion: Option<Completion<R>>,
    ) -> Result<ItemId, Rejected<T, R>> {
        if !self.config.is_enabled() {
            return Err(Rejected::Disabled);
        }

        let (id, depth) = {
            let mut inner = self.lock();
            if inner.items.len() >= self.config.max_size as usize {
                return Err(Rejected::Full(payload, completion));
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let enqueued_at = Instant::now();
            inner.heap.push(HeapKey {
                priority,
                enqueued_at,
                id,
            });
            inner.items.insert(
                id,
                QueuedItem {
                    id,
                    priority,
                    enqueued_at,
                    payload,
                    completion,
                },
            );
            (id, inner.items.len())
        };

        metrics::gauge!("switchyard_queue_depth").set(depth as f64);
        self.item_ready.notify_one();
        Ok(id)
    }

    /// Admit an item without waiting. Returns `QueueError::Full` at capacity
    /// regardless of the overflow policy.
    pub fn try_enqueue(
        &self,
        payload: T,
        priority: i32,
        completion: Option<Completion<R>>,
    ) -> Result<ItemId, QueueError> {
        self.admit(payload, priority, completion)
            .map_err(|rejected| match rejected {
                Rejected::Full(..) => QueueError::Full {
                    max_size: self.config.max_size,
                },
                Rejected::Disabled => QueueError::Disabled,
            })
    }

    /// Admit an item, honoring the configured overflow policy.
    ///
    /// With `OverflowPolicy::Block` a full queue makes the caller wait up to
    /// `max_wait_seconds` for space before failing with `QueueError::Full`.
    pub async fn enqueue(
        &self,
        payload: T,
        priority: i32,
        completion: Option<Completion<R>>,
    ) -> Result<ItemId, QueueError> {
        if self.config.overflow == OverflowPolicy::Reject {
            return self.try_enqueue(payload, priority, completion);
        }

        let deadline = Instant::now() + self.config.max_wait();
        let mut pending = (payload, completion);
        loop {
            match self.admit(pending.0, priority, pending.1) {
                Ok(id) => return Ok(id),
                Err(Rejected::Disabled) => return Err(QueueError::Disabled),
                Err(Rejected::Full(payload, completion)) => pending = (payload, completion),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || tokio::time::timeout(remaining, self.space_ready.notified())
                    .await
                    .is_err()
            {
                return Err(QueueError::Full {
                    max_size: self.config.max_size,
                });
            }
        }
    }

    /// Remove the highest-priority item without waiting.
    pub fn try_dequeue(&self) -> Option<QueuedItem<T, R>> {
        let (item, depth) = {
            let mut inner = self.lock();
            let mut found = None;
            while let Some(key) = inner.heap.pop() {
                if let Some(item) = inner.items.remove(&key.id) {
                    found = Some(item);
                    break;
                }
            }
            (found?, inner.items.len())
        };

        metrics::gauge!("switchyard_queue_depth").set(depth as f64);
        self.space_ready.notify_one();
        Some(item)
    }

    /// Wait up to `timeout` for an item. Returns `None` on timeout.
    pub async fn dequeue(&self, timeout: Duration) -> Option<QueuedItem<T, R>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            if tokio::time::timeout(remaining, self.item_ready.notified())
                .await
                .is_err()
            {
                return self.try_dequeue();
            }
        }
    }

    /// Remove a pending item by id.
    pub fn cancel(&self, id: ItemId) -> Option<QueuedItem<T, R>> {
        let (item, depth) = {
            let mut inner = self.lock();
            let item = inner.items.remove(&id)?;
            inner.heap.retain(|key| key.id != id);
            (item, inner.items.len())
        };

        metrics::gauge!("switchyard_queue_depth").set(depth as f64);
        self.space_ready.notify_one();
        Some(item)
    }

    /// Remove every pending item in priority order.
    pub fn drain(&self) -> Vec<QueuedItem<T, R>> {
        let mut drained = Vec::new();
        while let Some(item) = self.try_dequeue() {
            drained.push(item);
        }
        drained
    }

    /// Number of pending items.
    pub fn size(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Queue configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}

impl<T: Clone, R> RequestQueue<T, R> {
    /// Look at a pending item without removing it.
    pub fn peek(&self, id: ItemId) -> Option<PendingItem<T>> {
        self.lock().items.get(&id).map(|item| PendingItem {
            id: item.id,
            priority: item.priority,
            enqueued_at: item.enqueued_at,
            payload: item.payload.clone(),
        })
    }
}

enum Rejected<T, R> {
    Full(T, Option<Completion<R>>),
    Disabled,
}
