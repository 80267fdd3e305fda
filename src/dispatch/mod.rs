//! Dispatch cascade.
//!
//! A dispatch is answered by the first of:
//!
//! 1. the response cache (memory, then persistent tier)
//! 2. an identical dispatch already in flight
//! 3. the first backend in the resolved order that returns a non-empty
//!    response within its timeout
//! 4. the caller's fallback content
//!
//! Every backend attempt feeds the health monitor and the connectivity
//! cache, which shape the auto-mode order of later dispatches.

mod backend;
mod error;
pub mod order;


pub use backend::{BackendError, BackendHandler, SharedBackend};
pub use error::DispatchError;
pub use order::Selection;

use crate::cache::{CacheTier, ResponseCache};
use crate::config::SwitchyardConfig;
use crate::connectivity::ConnectivityCache;
use crate::dedup::Deduplicator;
use crate::fingerprint::Fingerprint;
use crate::health::HealthMonitor;
use crate::logging::{generate_request_id, AuditLog};
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::queue::RequestQueue;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Work handed to the cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    /// Short description of the task, part of the cache key
    pub task_description: String,
    pub prompt: String,
    /// Returned when every backend fails
    pub fallback_content: Option<String>,
    /// Overrides both the configured backend and auto ordering
    pub backend_order: Option<Vec<String>>,
}

impl DispatchRequest {
    pub fn new(task_description: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            task_description: task_description.into(),
            prompt: prompt.into(),
            fallback_content: None,
            backend_order: None,
        }
    }

    pub fn with_fallback(mut self, content: impl Into<String>) -> Self {
        self.fallback_content = Some(content.into());
        self
    }

    pub fn with_backend_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backend_order = Some(order.into_iter().map(Into::into).collect());
        self
    }
}

/// Where a dispatch result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ResponseSource {
    Cache(CacheTier),
    /// Shared result of an identical in-flight dispatch
    Deduplicated,
    Backend(String),
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResponse {
    pub request_id: String,
    pub content: String,
    pub source: ResponseSource,
    /// Backends that failed during this dispatch, in attempt order
    pub failed: Vec<String>,
    #[serde(serialize_with = "serialize_ms")]
    pub latency: Duration,
}

impl DispatchResponse {
    /// Name of the backend that produced the content, if one did.
    pub fn backend(&self) -> Option<&str> {
        match &self.source {
            ResponseSource::Backend(name) => Some(name),
            _ => None,
        }
    }
}

fn serialize_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Result delivered to a queued submitter.
pub type DispatchResult = Result<DispatchResponse, DispatchError>;

struct Winner {
    backend: String,
    content: String,
    latency: Duration,
}

/// Releases dedup waiters if the owning dispatch is dropped before it
/// publishes a result.
///
/// Only acts on the claim it was created for; a claim that expired and was
/// taken over by a newer dispatch is left alone.
struct OwnerGuard<'a> {
    dedup: &'a Deduplicator<Option<String>>,
    key: &'a Fingerprint,
    generation: u64,
    armed: bool,
}

impl OwnerGuard<'_> {
    fn publish(mut self, result: Option<String>) {
        self.armed = false;
        let failed = result.is_none();
        self.dedup.complete_owned(self.key, self.generation, result);
        if failed {
            // Waiters already subscribed see the sentinel; later callers retry
            self.dedup.discard_owned(self.key, self.generation);
        }
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.dedup.discard_owned(self.key, self.generation);
        }
    }
}

/// Orchestrates caching, deduplication, ordering and failover across a set
/// of backends.
pub struct Dispatcher {
    config: SwitchyardConfig,
    backends: Vec<SharedBackend>,
    static_order: Vec<String>,
    connectivity: ConnectivityCache,
    health: HealthMonitor,
    dedup: Arc<Deduplicator<Option<String>>>,
    cache: ResponseCache,
    queue: RequestQueue<DispatchRequest, DispatchResult>,
    metrics: DispatchMetrics,
    audit: AuditLog,
}

impl Dispatcher {
    /// Build a dispatcher over `backends`, listed in registration order.
    ///
    /// Later backends reusing an earlier name are ignored.
    pub fn new(config: SwitchyardConfig, backends: Vec<SharedBackend>) -> Self {
        let mut unique: Vec<SharedBackend> = Vec::with_capacity(backends.len());
        for backend in backends {
            if unique.iter().any(|b| b.name() == backend.name()) {
                tracing::warn!(backend = %backend.name(), "Ignoring duplicate backend name");
                continue;
            }
            unique.push(backend);
        }

        let registered: Vec<String> = unique.iter().map(|b| b.name().to_string()).collect();
        let static_order = order::static_order(&config.dispatch.default_order, &registered);

        tracing::info!(
            backends = ?static_order,
            mode = %config.dispatch.backend,
            "Dispatcher initialized"
        );

        Self {
            connectivity: ConnectivityCache::new(&config.connectivity),
            health: HealthMonitor::new(config.health.clone()),
            dedup: Arc::new(Deduplicator::new(&config.dedup)),
            cache: ResponseCache::new(&config.cache),
            queue: RequestQueue::new(config.queue.clone()),
            metrics: DispatchMetrics::new(),
            audit: AuditLog::new(&config.audit, config.logging.enable_content_logging),
            backends: unique,
            static_order,
            config,
        }
    }

    pub fn config(&self) -> &SwitchyardConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &ConnectivityCache {
        &self.connectivity
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn dedup(&self) -> &Arc<Deduplicator<Option<String>>> {
        &self.dedup
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn queue(&self) -> &RequestQueue<DispatchRequest, DispatchResult> {
        &self.queue
    }

    /// Backend names in static order.
    pub fn backend_names(&self) -> &[String] {
        &self.static_order
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Empty the in-memory response cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Cache and dedup key for a request under a selection.
    pub fn fingerprint(&self, request: &DispatchRequest, selection: &Selection) -> Fingerprint {
        let discriminator = selection.discriminator();
        Fingerprint::of_fields(&[
            Some(request.task_description.as_str()),
            Some(request.prompt.as_str()),
            request.fallback_content.as_deref(),
            Some(discriminator.as_str()),
        ])
    }

    fn selection(&self, request: &DispatchRequest) -> Selection {
        Selection::resolve(request.backend_order.as_deref(), &self.config.dispatch.backend)
    }

    /// Candidates to attempt, in order.
    pub fn plan(&self, request: &DispatchRequest) -> Vec<SharedBackend> {
        self.candidates(&self.selection(request))
    }

    fn candidates(&self, selection: &Selection) -> Vec<SharedBackend> {
        let names = match selection {
            Selection::Override(order) => order.clone(),
            Selection::Explicit(name) => vec![name.clone()],
            Selection::Auto => {
                order::rank_auto(&self.static_order, &self.connectivity, &self.health)
            }
        };

        let mut candidates = Vec::with_capacity(names.len());
        for name in &names {
            let Some(backend) = self.backends.iter().find(|b| b.name() == name) else {
                tracing::warn!(backend = %name, "Unknown backend requested, skipping");
                continue;
            };
            if !backend.is_available() {
                tracing::debug!(backend = %name, "Backend not available locally, skipping");
                continue;
            }
            if candidates
                .iter()
                .any(|c: &SharedBackend| c.name() == backend.name())
            {
                continue;
            }
            candidates.push(Arc::clone(backend));
        }
        candidates
    }

    /// Answer a request through the cascade.
    ///
    /// Only exhaustion without fallback content is an error; backend
    /// failures, timeouts and storage problems are absorbed.
    pub async fn dispatch(&self, request: &DispatchRequest) -> DispatchResult {
        let request_id = generate_request_id();
        let started = Instant::now();
        self.metrics.record_request();

        let selection = self.selection(request);
        let key = self.fingerprint(request, &selection);

        if let Some(hit) = self.cache.get(&key).await {
            let tier = match hit.tier {
                CacheTier::Memory => "memory",
                CacheTier::Persistent => "persistent",
            };
            self.metrics.record_cache_hit(tier);
            tracing::debug!(
                request_id = %request_id,
                fingerprint = key.short(),
                tier,
                "Cache hit"
            );
            return Ok(DispatchResponse {
                request_id,
                content: hit.value,
                source: ResponseSource::Cache(hit.tier),
                failed: Vec::new(),
                latency: started.elapsed(),
            });
        }

        let owner = if let Some(generation) = self.dedup.claim_key(&key) {
            Some(OwnerGuard {
                dedup: self.dedup.as_ref(),
                key: &key,
                generation,
                armed: true,
            })
        } else {
            let wait = self.config.dispatch.dedup_wait();
            match self.dedup.wait_for_result_key(&key, wait).await {
                Some(Some(content)) => {
                    self.metrics.record_dedup_hit();
                    tracing::debug!(
                        request_id = %request_id,
                        fingerprint = key.short(),
                        "Served by in-flight duplicate"
                    );
                    return Ok(DispatchResponse {
                        request_id,
                        content,
                        source: ResponseSource::Deduplicated,
                        failed: Vec::new(),
                        latency: started.elapsed(),
                    });
                }
                Some(None) => {
                    tracing::debug!(
                        request_id = %request_id,
                        fingerprint = key.short(),
                        "In-flight duplicate exhausted all backends"
                    );
                    self.metrics.record_error();
                    return self.exhausted(request, request_id, Vec::new(), started);
                }
                None => {
                    tracing::debug!(
                        request_id = %request_id,
                        fingerprint = key.short(),
                        "Duplicate wait ended without result, dispatching independently"
                    );
                    None
                }
            }
        };

        let candidates = self.candidates(&selection);
        let (winner, failed) = self.cascade(request, &request_id, &candidates).await;

        match winner {
            Some(winner) => {
                self.cache.put(&key, winner.content.as_str()).await;
                match owner {
                    Some(guard) => guard.publish(Some(winner.content.clone())),
                    None => self.dedup.store_result_key(&key, Some(winner.content.clone())),
                }
                self.metrics.record_success(&winner.backend, winner.latency);

                let record = self
                    .audit
                    .entry(
                        &request_id,
                        Some(&winner.backend),
                        &request.prompt,
                        Some(&winner.content),
                        winner.latency,
                        true,
                    )
                    .with_metadata("failed", failed.clone());
                self.audit.record(&record).await;

                tracing::info!(
                    request_id = %request_id,
                    backend = %winner.backend,
                    latency_ms = winner.latency.as_millis() as u64,
                    failed = failed.len(),
                    "Dispatch completed"
                );

                Ok(DispatchResponse {
                    request_id,
                    content: winner.content,
                    source: ResponseSource::Backend(winner.backend),
                    failed,
                    latency: started.elapsed(),
                })
            }
            None => {
                if let Some(guard) = owner {
                    guard.publish(None);
                }
                self.metrics.record_error();

                let record = self
                    .audit
                    .entry(
                        &request_id,
                        None,
                        &request.prompt,
                        None,
                        started.elapsed(),
                        false,
                    )
                    .with_metadata("failed", failed.clone());
                self.audit.record(&record).await;

                tracing::warn!(
                    request_id = %request_id,
                    attempted = ?failed,
                    fallback = request.fallback_content.is_some(),
                    "All backends exhausted"
                );
                self.exhausted(request, request_id, failed, started)
            }
        }
    }

    fn exhausted(
        &self,
        request: &DispatchRequest,
        request_id: String,
        failed: Vec<String>,
        started: Instant,
    ) -> DispatchResult {
        match &request.fallback_content {
            Some(content) => Ok(DispatchResponse {
                request_id,
                content: content.clone(),
                source: ResponseSource::Fallback,
                failed,
                latency: started.elapsed(),
            }),
            None => Err(DispatchError::Exhausted { attempted: failed }),
        }
    }

    /// Attempt candidates in order until one returns content.
    async fn cascade(
        &self,
        request: &DispatchRequest,
        request_id: &str,
        candidates: &[SharedBackend],
    ) -> (Option<Winner>, Vec<String>) {
        let mut failed = Vec::new();

        for backend in candidates {
            let name = backend.name();
            let timeout = self.config.dispatch.timeout_for(name);
            let attempt_started = Instant::now();

            let outcome = match tokio::time::timeout(timeout, backend.invoke(request)).await {
                Ok(Ok(content)) if !content.trim().is_empty() => Ok(content),
                Ok(Ok(_)) => Err(BackendError::EmptyResponse(name.to_string())),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(BackendError::timeout(name, timeout)),
            };
            let latency = attempt_started.elapsed();

            match outcome {
                Ok(content) => {
                    self.health.record_success(name, latency);
                    self.connectivity.update(name, true);
                    return (
                        Some(Winner {
                            backend: name.to_string(),
                            content,
                            latency,
                        }),
                        failed,
                    );
                }
                Err(e) => {
                    if e.is_timeout() {
                        self.metrics.record_timeout(name);
                    }
                    self.metrics.record_backend_failure(name);
                    self.health.record_failure(name, latency);
                    self.connectivity.update(name, false);
                    tracing::warn!(
                        request_id = %request_id,
                        backend = %name,
                        latency_ms = latency.as_millis() as u64,
                        error = %e,
                        "Backend attempt failed, trying next"
                    );
                    failed.push(name.to_string());
                }
            }
        }

        (None, failed)
    }

    /// Admit a request to the queue for serialized dispatch.
    ///
    /// The returned receiver yields the dispatch result once
    /// [`run_queue`](Self::run_queue) processes the item.
    pub async fn submit(
        &self,
        request: DispatchRequest,
        priority: i32,
    ) -> Result<oneshot::Receiver<DispatchResult>, DispatchError> {
        let (tx, rx) = oneshot::channel();
        let id = self.queue.enqueue(request, priority, Some(tx)).await?;
        tracing::debug!(item = id, priority, "Request queued");
        Ok(rx)
    }

    /// Drain the queue serially until `cancel` fires.
    ///
    /// Items that waited longer than the queue's max wait are answered with
    /// `DispatchError::QueueTimeout` without being dispatched. On shutdown,
    /// remaining items are answered with `DispatchError::QueueClosed`.
    pub async fn run_queue(&self, cancel: CancellationToken) {
        tracing::info!("Queue drain loop started");
        let max_wait = self.queue.config().max_wait();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Queue drain loop shutting down");
                    self.drain_remaining();
                    break;
                }
                item = self.queue.dequeue(Duration::from_millis(250)) => {
                    let Some(mut item) = item else {
                        continue;
                    };

                    let waited = item.enqueued_at.elapsed();
                    if waited > max_wait {
                        tracing::warn!(
                            item = item.id,
                            priority = item.priority,
                            waited_ms = waited.as_millis() as u64,
                            "Queued request timed out"
                        );
                        item.complete(Err(DispatchError::QueueTimeout {
                            waited_ms: waited.as_millis() as u64,
                        }));
                        continue;
                    }

                    let result = self.dispatch(&item.payload).await;
                    if !item.complete(result) {
                        tracing::debug!(item = item.id, "Submitter dropped before completion");
                    }
                }
            }
        }

        tracing::info!("Queue drain loop stopped");
    }

    fn drain_remaining(&self) {
        for mut item in self.queue.drain() {
            item.complete(Err(DispatchError::QueueClosed));
        }
    }

    /// Start the queue drain loop and the dedup sweeper.
    pub fn spawn_workers(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let queue_worker = {
            let dispatcher = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.run_queue(cancel).await })
        };
        let sweeper = Arc::clone(&self.dedup).spawn_sweeper(cancel);
        vec![queue_worker, sweeper]
    }
}
