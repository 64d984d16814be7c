// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline request queue.
//!
//! Mutations that cannot reach the server are recorded here, persisted under
//! [`QUEUE_KEY`], and replayed once connectivity returns. Each processing
//! pass takes up to `batch_size` eligible requests in replay order and runs
//! them concurrently:
//! - success removes the request
//! - a non-retryable failure (4xx) removes it and reports it
//! - a retryable failure bumps `retry_count`; once over budget the request
//!   stays queued as failed until retried, removed or cleared
//!
//! Passes repeat after a fixed `retry_delay` while eligible requests remain
//! and the queue is online. Only one retry timer is armed at a time.
//!
//! A [`SettleHook`] hears how every request left the active set, so callers
//! holding optimistic state for it can commit or roll back.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use offsync_core::request::{sort_for_replay, truncate_to};
use offsync_core::{
    Error, KeyPattern, NewRequest, QueueStatus, QueuedRequest, RequestId, Result,
};
use serde::Serialize;

use crate::cache::CacheSink;
use crate::context::SyncContext;
use crate::executor::ExecuteRequest;
use crate::lock;
use crate::notify::NotifyKind;
use crate::scheduler::{Task, TaskHandle};
use crate::store::QUEUE_KEY;

/// Tuning for the Request Queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    pub batch_size: usize,
    pub retry_delay: Duration,
    pub default_max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            max_queue_size: 100,
            batch_size: 5,
            retry_delay: Duration::from_millis(5_000),
            default_max_retries: 3,
        }
    }
}

/// Outcome counts for one or more processing passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub succeeded: usize,
    pub retried: usize,
    pub exhausted: usize,
    pub rejected: usize,
}

impl PassSummary {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.retried + self.exhausted + self.rejected
    }

    fn absorb(&mut self, other: PassSummary) {
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.exhausted += other.exhausted;
        self.rejected += other.rejected;
    }
}

/// Boxed future returned by [`SettleHook::settled`].
pub type SettleFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Told how each request left the active set: `Ok` when delivered, the
/// failure when rejected, out of retries, evicted or removed while pending.
pub trait SettleHook: Send + Sync {
    fn settled<'a>(&'a self, id: &'a RequestId, outcome: Result<()>) -> SettleFuture<'a>;
}

type Settled = Vec<(RequestId, Result<()>)>;

/// Durable, priority-ordered queue of deferred mutations.
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    config: QueueConfig,
    ctx: SyncContext,
    /// Held across the persistence write so the stored mirror never lags a mutation.
    requests: tokio::sync::Mutex<Vec<QueuedRequest>>,
    sink: Mutex<Option<Arc<dyn CacheSink>>>,
    settle_hook: Mutex<Option<Arc<dyn SettleHook>>>,
    processing: AtomicBool,
    online: AtomicBool,
    seq: AtomicU64,
    retry_timer: Mutex<Option<TaskHandle>>,
}

/// Clears the processing flag when a pass ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl QueueInner {
    async fn persist(&self, requests: &[QueuedRequest]) -> Result<()> {
        let json = serde_json::to_string(requests)?;
        self.ctx.store.set(QUEUE_KEY, json).await
    }

    fn notify(&self, message: &str, kind: NotifyKind) {
        self.ctx.notifier.notify(message, kind);
    }
}

fn label(request: &QueuedRequest) -> String {
    match &request.metadata.description {
        Some(description) => description.clone(),
        None => format!("{} {}", request.method, request.target),
    }
}

fn failure_message(request: &QueuedRequest, err: &Error) -> String {
    match &request.metadata.error_message {
        Some(message) => message.clone(),
        None => format!("{} failed: {err}", label(request)),
    }
}

impl RequestQueue {
    /// Opens the queue, restoring any persisted requests. The queue starts offline.
    pub async fn open(config: QueueConfig, ctx: SyncContext) -> Result<Self> {
        let mut requests: Vec<QueuedRequest> = match ctx.store.get(QUEUE_KEY).await? {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        sort_for_replay(&mut requests);
        tracing::debug!(count = requests.len(), "restored request queue");

        let seq = requests.len() as u64;
        Ok(RequestQueue {
            inner: Arc::new(QueueInner {
                config,
                ctx,
                requests: tokio::sync::Mutex::new(requests),
                sink: Mutex::new(None),
                settle_hook: Mutex::new(None),
                processing: AtomicBool::new(false),
                online: AtomicBool::new(false),
                seq: AtomicU64::new(seq),
                retry_timer: Mutex::new(None),
            }),
        })
    }

    /// Routes settle-time invalidations to the cache.
    pub fn set_sink(&self, sink: Arc<dyn CacheSink>) {
        *lock(&self.inner.sink) = Some(sink);
    }

    pub fn set_settle_hook(&self, hook: Arc<dyn SettleHook>) {
        *lock(&self.inner.settle_hook) = Some(hook);
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::Acquire)
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::Acquire)
    }

    /// Records a request and persists the queue.
    ///
    /// Online, a processing pass starts in the background. Offline, the
    /// notifier is told the request was deferred. If the queue is over
    /// `max_queue_size` afterwards, the lowest priority entries are dropped.
    pub async fn enqueue(&self, request: NewRequest) -> Result<RequestId> {
        let inner = &self.inner;
        let now = inner.ctx.clock.now_ms();
        let (id, description, evicted) = {
            let mut requests = inner.requests.lock().await;
            let previous = requests.clone();

            let mut queued = QueuedRequest::from_new(
                request.clone(),
                now,
                inner.seq.fetch_add(1, Ordering::Relaxed),
                inner.config.default_max_retries,
            );
            while requests.iter().any(|r| r.id == queued.id) {
                let seq = inner.seq.fetch_add(1, Ordering::Relaxed);
                queued = QueuedRequest::from_new(
                    request.clone(),
                    now,
                    seq,
                    inner.config.default_max_retries,
                );
            }
            let id = queued.id.clone();
            let description = label(&queued);

            requests.push(queued);
            sort_for_replay(&mut requests);
            let evicted = truncate_to(&mut requests, inner.config.max_queue_size);
            let max = inner.config.max_queue_size;
            if !evicted.is_empty() {
                let overflow = Error::QueueOverflow { dropped: evicted.len(), max };
                let dropped: Vec<&str> = evicted.iter().map(|r| r.id.as_str()).collect();
                tracing::warn!(?dropped, "{overflow}");
            }

            if let Err(e) = inner.persist(&requests).await {
                *requests = previous;
                return Err(e);
            }
            let evicted: Settled = evicted
                .iter()
                .map(|r| (r.id.clone(), Err(Error::QueueOverflow { dropped: evicted.len(), max })))
                .collect();
            (id, description, evicted)
        };
        tracing::debug!(id = %id, "enqueued request");
        // The caller may still be recording the new id; report in the background.
        self.report_later(evicted);

        if self.is_online() {
            self.trigger();
        } else {
            inner.notify(&format!("{description} queued for sync"), NotifyKind::Info);
        }
        Ok(id)
    }

    /// Runs one processing pass and arms the retry timer if work remains.
    ///
    /// No-op when offline, when another pass is running, or when nothing is
    /// eligible.
    pub async fn process_queue(&self) -> PassSummary {
        let summary = self.run_pass().await;
        self.schedule_follow_up().await;
        summary
    }

    /// Runs passes back to back until nothing eligible remains or the queue
    /// goes offline, sleeping `retry_delay` between passes that left retries
    /// behind. A retry timer armed by a background pass meanwhile is
    /// cancelled, so passes never interleave with the drain.
    pub async fn drain(&self) -> PassSummary {
        let mut total = PassSummary::default();
        loop {
            let pass = self.run_pass().await;
            self.cancel_retry_timer();
            total.absorb(pass);
            if !self.is_online() || !self.has_eligible().await {
                break;
            }
            if pass.retried > 0 || pass.attempted() == 0 {
                tokio::time::sleep(self.inner.config.retry_delay).await;
            }
        }
        total
    }

    /// One-shot replay: drains as if online without starting background
    /// passes, then restores the previous connectivity.
    pub async fn replay_now(&self) -> PassSummary {
        let was_online = self.inner.online.swap(true, Ordering::AcqRel);
        let summary = self.drain().await;
        if !was_online {
            self.inner.online.store(false, Ordering::Release);
        }
        summary
    }

    async fn run_pass(&self) -> PassSummary {
        let inner = &self.inner;
        if !self.is_online() {
            return PassSummary::default();
        }
        if inner
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("queue pass already running");
            return PassSummary::default();
        }
        let _guard = ProcessingGuard(&inner.processing);

        let batch: Vec<QueuedRequest> = {
            let requests = inner.requests.lock().await;
            requests
                .iter()
                .filter(|r| r.is_eligible())
                .take(inner.config.batch_size)
                .cloned()
                .collect()
        };
        if batch.is_empty() {
            return PassSummary::default();
        }

        let results = join_all(
            batch.iter().map(|r| inner.ctx.executor.execute(ExecuteRequest::from_queued(r))),
        )
        .await;

        let mut summary = PassSummary::default();
        let mut settled = Vec::new();
        let mut outcomes: Settled = Vec::new();
        let mut quiet_successes = 0;
        {
            let mut requests = inner.requests.lock().await;
            for (request, result) in batch.into_iter().zip(results) {
                let Some(index) = requests.iter().position(|r| r.id == request.id) else {
                    tracing::debug!(id = %request.id, "request removed while in flight");
                    continue;
                };
                match result {
                    Ok(_) => {
                        let done = requests.remove(index);
                        tracing::debug!(id = %done.id, "replayed request");
                        summary.succeeded += 1;
                        match &done.metadata.success_message {
                            Some(message) => inner.notify(message, NotifyKind::Success),
                            None => quiet_successes += 1,
                        }
                        outcomes.push((done.id.clone(), Ok(())));
                        settled.push(done);
                    }
                    Err(err) if !err.is_retryable() => {
                        let done = requests.remove(index);
                        tracing::warn!(id = %done.id, error = %err, "request rejected, dropping");
                        summary.rejected += 1;
                        inner.notify(&failure_message(&done, &err), NotifyKind::Error);
                        outcomes.push((done.id.clone(), Err(err)));
                        settled.push(done);
                    }
                    Err(err) => {
                        let entry = &mut requests[index];
                        entry.retry_count += 1;
                        entry.last_error = Some(err.to_string());
                        if entry.is_failed() {
                            tracing::warn!(
                                id = %entry.id,
                                attempts = entry.attempts(),
                                error = %err,
                                "retry budget exhausted"
                            );
                            summary.exhausted += 1;
                            let message =
                                format!("{} Retry manually.", failure_message(entry, &err));
                            inner.notify(&message, NotifyKind::Error);
                            outcomes.push((entry.id.clone(), Err(err)));
                            settled.push(entry.clone());
                        } else {
                            tracing::debug!(
                                id = %entry.id,
                                retry_count = entry.retry_count,
                                error = %err,
                                "request failed, will retry"
                            );
                            summary.retried += 1;
                        }
                    }
                }
            }
            if let Err(e) = inner.persist(&requests).await {
                tracing::warn!(error = %e, "failed to persist queue after pass");
            }
        }

        if quiet_successes > 0 {
            inner.notify(
                &format!("Synced {quiet_successes} queued request(s)"),
                NotifyKind::Success,
            );
        }
        self.report(outcomes).await;
        self.invalidate_settled(&settled);
        tracing::info!(
            succeeded = summary.succeeded,
            retried = summary.retried,
            exhausted = summary.exhausted,
            rejected = summary.rejected,
            "queue pass complete"
        );
        summary
    }

    async fn report(&self, outcomes: Settled) {
        let hook = lock(&self.inner.settle_hook).clone();
        let Some(hook) = hook else {
            return;
        };
        for (id, outcome) in outcomes {
            hook.settled(&id, outcome).await;
        }
    }

    fn report_later(&self, outcomes: Settled) {
        if outcomes.is_empty() {
            return;
        }
        let queue = self.clone();
        self.inner.ctx.scheduler.spawn(Box::pin(async move {
            queue.report(outcomes).await;
        }));
    }

    fn invalidate_settled(&self, settled: &[QueuedRequest]) {
        let Some(sink) = lock(&self.inner.sink).clone() else {
            return;
        };
        let patterns: BTreeSet<&String> =
            settled.iter().flat_map(|r| r.metadata.invalidates.iter()).collect();
        for pattern in patterns {
            match KeyPattern::new(pattern) {
                Ok(pattern) => sink.invalidate(&pattern),
                Err(e) => tracing::warn!(error = %e, "skipping invalidation"),
            }
        }
    }

    async fn has_eligible(&self) -> bool {
        self.inner.requests.lock().await.iter().any(|r| r.is_eligible())
    }

    async fn schedule_follow_up(&self) {
        if self.is_online() && self.has_eligible().await {
            self.schedule_pass(self.inner.config.retry_delay);
        }
    }

    /// Arms the single retry timer, replacing any pending one.
    fn schedule_pass(&self, delay: Duration) {
        let queue = self.clone();
        let task: Task = Box::pin(async move {
            lock(&queue.inner.retry_timer).take();
            queue.process_queue().await;
        });
        let handle = self.inner.ctx.scheduler.schedule_after(delay, task);
        if let Some(previous) = lock(&self.inner.retry_timer).replace(handle) {
            previous.cancel();
        }
    }

    /// Starts a pass in the background unless the retry timer is armed, in
    /// which case new work joins that pass.
    fn trigger(&self) {
        let queue = self.clone();
        self.inner.ctx.scheduler.spawn(Box::pin(async move {
            let timer_armed = lock(&queue.inner.retry_timer).is_some();
            if timer_armed {
                tracing::debug!("retry pass already scheduled");
                return;
            }
            queue.process_queue().await;
        }));
    }

    fn cancel_retry_timer(&self) {
        if let Some(timer) = lock(&self.inner.retry_timer).take() {
            timer.cancel();
        }
    }

    /// Applies a connectivity edge. Offline to online starts a pass; online
    /// to offline cancels the pending retry. Repeated values are ignored.
    pub fn set_online(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::AcqRel);
        if was_online == online {
            return;
        }
        if online {
            tracing::info!("online, replaying queued requests");
            self.trigger();
        } else {
            tracing::info!("offline, suspending queue replay");
            self.cancel_retry_timer();
        }
    }

    /// Removes one request. Returns whether it was queued.
    pub async fn remove_from_queue(&self, id: &RequestId) -> Result<bool> {
        let mut requests = self.inner.requests.lock().await;
        let Some(index) = requests.iter().position(|r| &r.id == id) else {
            return Ok(false);
        };
        let removed = requests.remove(index);
        self.inner.persist(&requests).await?;
        drop(requests);
        // Failed requests were reported when they ran out of retries.
        if !removed.is_failed() {
            self.report(vec![(removed.id, Err(Error::Discarded(id.to_string())))]).await;
        }
        Ok(true)
    }

    /// Drops every request. Returns how many were removed.
    pub async fn clear_queue(&self) -> Result<usize> {
        self.cancel_retry_timer();
        let mut requests = self.inner.requests.lock().await;
        let count = requests.len();
        let removed: Settled = requests
            .drain(..)
            .filter(|r| !r.is_failed())
            .map(|r| {
                let err = Error::Discarded(r.id.to_string());
                (r.id, Err(err))
            })
            .collect();
        self.inner.persist(&requests).await?;
        drop(requests);
        self.report(removed).await;
        Ok(count)
    }

    /// Gives failed requests a fresh retry budget and starts a pass if online.
    /// Returns how many were reset.
    pub async fn retry_failed_requests(&self) -> Result<usize> {
        let reset = {
            let mut requests = self.inner.requests.lock().await;
            let mut reset = 0;
            for request in requests.iter_mut().filter(|r| r.is_failed()) {
                request.retry_count = 0;
                request.last_error = None;
                reset += 1;
            }
            if reset > 0 {
                self.inner.persist(&requests).await?;
            }
            reset
        };
        if reset > 0 && self.is_online() {
            self.trigger();
        }
        Ok(reset)
    }

    pub async fn status(&self) -> QueueStatus {
        let requests = self.inner.requests.lock().await;
        QueueStatus::from_requests(&requests, self.is_processing(), self.is_online())
    }

    /// Snapshot of every queued request in replay order.
    pub async fn requests(&self) -> Vec<QueuedRequest> {
        self.inner.requests.lock().await.clone()
    }

    /// Snapshot of requests that exhausted their retry budget.
    pub async fn failed_requests(&self) -> Vec<QueuedRequest> {
        self.inner.requests.lock().await.iter().filter(|r| r.is_failed()).cloned().collect()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
