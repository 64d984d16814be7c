// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring for the queue, cache and real-time channel.
//!
//! A [`SyncEngine`] owns one of each, routes queue settlements and channel
//! events into the cache, and forwards connectivity edges to the queue and
//! cache. [`SyncEngine::mutate`] runs the optimistic update protocol:
//!
//! ```text
//! apply patch ──offline──────────────────────────► queue (patch held)
//!      │
//!    online ── execute ── ok ──────────────────────► commit + invalidate
//!                    ├── retryable failure ────────► queue (patch held)
//!                    └── rejected ─────────────────► roll back, error
//! ```
//!
//! A held patch is settled when its queued request leaves the queue:
//! committed once delivered, rolled back if rejected, out of retries,
//! evicted or removed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::collections::HashMap;
use std::sync::Arc;

use offsync_core::{KeyPattern, NewRequest, QueryKey, RequestId};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheSink, PatchHandle, SyncCache};
use crate::channel::RealtimeChannel;
use crate::config::Config;
use crate::context::SyncContext;
use crate::error::Result;
use crate::executor::ExecuteRequest;
use crate::notify::NotifyKind;
use crate::queue::{RequestQueue, SettleFuture, SettleHook};

/// How a mutation was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The server accepted it; the committed cache value.
    Applied(Value),
    /// Deferred for replay; the optimistic value stays visible until the
    /// replay settles.
    Queued(RequestId),
}

/// Optimistic patches waiting on queued requests.
struct HeldPatches {
    cache: SyncCache,
    /// Locked across enqueue so a settlement cannot miss its handle.
    handles: tokio::sync::Mutex<HashMap<RequestId, PatchHandle>>,
}

impl SettleHook for HeldPatches {
    fn settled<'a>(&'a self, id: &'a RequestId, outcome: offsync_core::Result<()>) -> SettleFuture<'a> {
        Box::pin(async move {
            let handle = self.handles.lock().await.remove(id);
            let Some(handle) = handle else {
                return;
            };
            if let Err(e) = self.cache.commit_or_rollback(handle, outcome).await {
                tracing::debug!(id = %id, error = %e, "queued mutation not applied");
            }
        })
    }
}

pub struct SyncEngine {
    ctx: SyncContext,
    queue: RequestQueue,
    cache: SyncCache,
    channel: Option<RealtimeChannel>,
    held: Arc<HeldPatches>,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl SyncEngine {
    /// Builds the engine from `config`. The channel exists only when
    /// `[channel] url` is set. Nothing goes online until [`start`](Self::start).
    pub async fn new(config: &Config, ctx: SyncContext) -> Result<Self> {
        let rules = config.channel.rules()?;
        let queue = RequestQueue::open(config.queue.to_queue_config(), ctx.clone()).await?;
        let cache = SyncCache::new(config.cache.to_cache_config(), ctx.clone());
        queue.set_sink(Arc::new(cache.clone()));
        let held = Arc::new(HeldPatches { cache: cache.clone(), handles: Default::default() });
        queue.set_settle_hook(held.clone());

        let channel = config
            .channel
            .to_channel_config()
            .map(|channel| RealtimeChannel::websocket(channel, rules, ctx.clone()));

        let engine = SyncEngine {
            ctx,
            queue,
            cache,
            channel: None,
            held,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        };
        Ok(match channel {
            Some(channel) => engine.with_channel(channel),
            None => engine,
        })
    }

    /// Replaces the channel, routing its events into this engine's cache.
    pub fn with_channel(mut self, channel: RealtimeChannel) -> Self {
        channel.set_sink(Arc::new(self.cache.clone()) as Arc<dyn CacheSink>);
        self.channel = Some(channel);
        self
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn cache(&self) -> &SyncCache {
        &self.cache
    }

    pub fn channel(&self) -> Option<&RealtimeChannel> {
        self.channel.as_ref()
    }

    /// Applies the current connectivity, connects the channel and forwards
    /// every later edge to the queue and cache. Only the first call has
    /// any effect.
    pub fn start(&self, mut connectivity: watch::Receiver<bool>) {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("engine already started");
            return;
        }
        let online = *connectivity.borrow_and_update();
        self.apply_connectivity(online);
        if let Some(channel) = &self.channel {
            channel.connect();
        }

        let queue = self.queue.clone();
        let cache = self.cache.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            tracing::debug!("connectivity monitor closed");
                            break;
                        }
                        let online = *connectivity.borrow_and_update();
                        queue.set_online(online);
                        cache.set_online(online);
                    }
                }
            }
        });
    }

    fn apply_connectivity(&self, online: bool) {
        self.queue.set_online(online);
        self.cache.set_online(online);
    }

    /// Stops forwarding connectivity and closes the channel.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(channel) = &self.channel {
            channel.disconnect();
        }
    }

    /// Applies `updater` to `key` optimistically and delivers `request`.
    ///
    /// The exact key is added to the request's invalidations so a queued
    /// replay reconciles the cache once it settles.
    pub async fn mutate<F>(
        &self,
        key: &QueryKey,
        request: NewRequest,
        updater: F,
    ) -> offsync_core::Result<MutationOutcome>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let request = request.invalidates(KeyPattern::exact(key).as_str());
        let handle = self.cache.apply_optimistic(key, updater)?;

        if !self.queue.is_online() {
            return self.defer(handle, request).await;
        }

        let call = ExecuteRequest::new(request.method, request.target.clone())
            .payload(request.payload.clone());
        match self.ctx.executor.execute(call).await {
            Err(err) if err.is_retryable() => {
                tracing::debug!(key = %key, error = %err, "direct mutation failed, queueing");
                self.defer(handle, request).await
            }
            result => {
                let settled = result.map(drop);
                if let (Err(err), Some(message)) = (&settled, &request.metadata.error_message) {
                    tracing::warn!(key = %key, error = %err, "mutation rejected");
                    self.ctx.notifier.notify(message, NotifyKind::Error);
                }
                self.cache.commit_or_rollback(handle, settled).await?;

                if let Some(message) = &request.metadata.success_message {
                    self.ctx.notifier.notify(message, NotifyKind::Success);
                }
                for pattern in &request.metadata.invalidates {
                    match KeyPattern::new(pattern) {
                        Ok(pattern) => self.cache.invalidate(&pattern),
                        Err(e) => tracing::warn!(error = %e, "skipping invalidation"),
                    }
                }
                Ok(MutationOutcome::Applied(self.cache.get(key).unwrap_or(Value::Null)))
            }
        }
    }

    /// Queues `request` and holds the patch until the queue settles it. If
    /// the request cannot be queued the patch is rolled back.
    async fn defer(
        &self,
        handle: PatchHandle,
        request: NewRequest,
    ) -> offsync_core::Result<MutationOutcome> {
        let mut handles = self.held.handles.lock().await;
        match self.queue.enqueue(request).await {
            Ok(id) => {
                handles.insert(id.clone(), handle);
                Ok(MutationOutcome::Queued(id))
            }
            Err(err) => {
                drop(handles);
                tracing::warn!(key = %handle.key(), error = %err, "could not queue mutation, rolling back");
                self.cache.rollback(handle).await?;
                Err(err)
            }
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
