// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Real-time channel client.
//!
//! ```text
//! disconnected --connect()--> connecting --open--> connected
//!      ^                          |                    |
//!      |                   error / timeout      lost / server close
//!      |                          v                    v
//!      +---- disconnect() ---- disconnected <----------+
//!                                 |
//!                        reconnect after backoff
//! ```
//!
//! Each unplanned failure schedules a reconnect after
//! `base * 2^(attempt - 1)` until `max_reconnect_attempts` is used up.
//! Topics are re-subscribed on every successful open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use offsync_core::{ChannelStatus, ConnectionState, Envelope, Error, Result};
use reqwest::Url;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::dispatch::{Dispatch, InvalidationRules};
use super::listeners::{EventListener, ListenerId, ListenerRegistry};
use super::state::SharedChannelState;
use super::transport::{Transport, WebSocketTransport};
use crate::cache::CacheSink;
use crate::context::SyncContext;
use crate::lock;
use crate::notify::NotifyKind;
use crate::scheduler::{Task, TaskHandle};

/// Builds a fresh transport for each connect attempt.
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

/// Delay before reconnect attempt `attempt` (1-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub url: String,
    /// Sent as the `token` query parameter.
    pub token: Option<String>,
    /// Declared after every successful open.
    pub topics: Vec<String>,
    pub base_reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub ping_interval: Duration,
    pub connect_timeout: Duration,
    /// Close the session when nothing arrives for this long. Off when `None`.
    pub liveness_timeout: Option<Duration>,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        ChannelConfig {
            url: url.into(),
            token: None,
            topics: vec!["revenue".into(), "conversions".into(), "notifications".into()],
            base_reconnect_interval: Duration::from_millis(5_000),
            max_reconnect_attempts: 10,
            ping_interval: Duration::from_millis(30_000),
            connect_timeout: Duration::from_millis(10_000),
            liveness_timeout: None,
        }
    }

    /// The URL actually dialled, with the token appended.
    pub fn connect_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| Error::Transport(format!("invalid channel url {}: {e}", self.url)))?;
        if let Some(token) = &self.token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url.into())
    }
}

/// Why a session ended.
enum SessionEnd {
    /// `disconnect()` was called.
    Closed,
    Lost(String),
}

/// Handle to the real-time channel. Cloning is cheap; clones share the
/// connection.
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    config: ChannelConfig,
    rules: InvalidationRules,
    ctx: SyncContext,
    factory: TransportFactory,
    state: SharedChannelState,
    listeners: ListenerRegistry,
    sink: Mutex<Option<Arc<dyn CacheSink>>>,
    /// Cancelled by `disconnect()`; replaced by `connect()`.
    lifecycle: Mutex<CancellationToken>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    reconnect: Mutex<Option<TaskHandle>>,
    manual_close: AtomicBool,
}

impl RealtimeChannel {
    pub fn new(
        config: ChannelConfig,
        rules: InvalidationRules,
        ctx: SyncContext,
        factory: TransportFactory,
    ) -> Self {
        let lifecycle = CancellationToken::new();
        lifecycle.cancel();
        RealtimeChannel {
            inner: Arc::new(ChannelInner {
                config,
                rules,
                ctx,
                factory,
                state: SharedChannelState::new(),
                listeners: ListenerRegistry::new(),
                sink: Mutex::new(None),
                lifecycle: Mutex::new(lifecycle),
                outbound: Mutex::new(None),
                reconnect: Mutex::new(None),
                manual_close: AtomicBool::new(false),
            }),
        }
    }

    /// Channel over real WebSockets.
    pub fn websocket(config: ChannelConfig, rules: InvalidationRules, ctx: SyncContext) -> Self {
        let factory: TransportFactory =
            Arc::new(|| Box::new(WebSocketTransport::new()) as Box<dyn Transport>);
        Self::new(config, rules, ctx, factory)
    }

    /// Routes built-in invalidations and pushed updates to the cache.
    pub fn set_sink(&self, sink: Arc<dyn CacheSink>) {
        *lock(&self.inner.sink) = Some(sink);
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn status(&self) -> ChannelStatus {
        self.inner.state.status()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn add_event_listener(
        &self,
        event_type: impl Into<String>,
        listener: EventListener,
    ) -> ListenerId {
        self.inner.listeners.add(event_type, listener)
    }

    pub fn remove_event_listener(&self, event_type: &str, id: ListenerId) -> bool {
        self.inner.listeners.remove(event_type, id)
    }

    /// Starts connecting in the background. No-op while connecting or
    /// connected. Clears a previous exhaustion.
    pub fn connect(&self) {
        let inner = &self.inner;
        if inner.state.get() != ConnectionState::Disconnected {
            tracing::debug!("channel already connecting or connected");
            return;
        }
        inner.manual_close.store(false, Ordering::Release);
        inner.state.set_exhausted(false);
        self.cancel_reconnect();

        let token = CancellationToken::new();
        let previous = std::mem::replace(&mut *lock(&inner.lifecycle), token.clone());
        previous.cancel();

        inner.state.set(ConnectionState::Connecting);
        inner.ctx.scheduler.spawn(self.attempt_task(token));
    }

    /// Closes the connection on purpose. No reconnect follows.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        inner.manual_close.store(true, Ordering::Release);
        self.cancel_reconnect();
        lock(&inner.lifecycle).cancel();
        lock(&inner.outbound).take();
        inner.state.set(ConnectionState::Disconnected);
        tracing::info!("real-time channel disconnected");
    }

    /// Queues a frame for the server. Fails with [`Error::NotConnected`]
    /// unless connected.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        if self.inner.state.get() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        match lock(&self.inner.outbound).as_ref() {
            Some(tx) => tx.send(envelope).map_err(|_| Error::NotConnected),
            None => Err(Error::NotConnected),
        }
    }

    fn cancel_reconnect(&self) {
        if let Some(handle) = lock(&self.inner.reconnect).take() {
            handle.cancel();
        }
    }

    fn attempt_task(&self, token: CancellationToken) -> Task {
        let channel = self.clone();
        Box::pin(async move { channel.attempt(token).await })
    }

    async fn attempt(&self, token: CancellationToken) {
        if token.is_cancelled() {
            return;
        }
        let inner = &self.inner;
        inner.state.set(ConnectionState::Connecting);

        let url = match inner.config.connect_url() {
            Ok(url) => url,
            Err(e) => return self.on_failure(e.to_string(), &token),
        };
        let mut transport = (inner.factory)();
        let timeout = inner.config.connect_timeout;

        let opened = tokio::select! {
            _ = token.cancelled() => return,
            result = tokio::time::timeout(timeout, transport.connect(&url)) => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("connect timed out after {}ms", timeout.as_millis())),
            },
        };

        match opened {
            Ok(()) => self.run_session(transport, token).await,
            Err(reason) => {
                tracing::debug!(error = %reason, "connect attempt failed");
                self.on_failure(reason, &token);
            }
        }
    }

    async fn run_session(&self, mut transport: Box<dyn Transport>, token: CancellationToken) {
        let inner = &self.inner;
        let (tx, mut outbound) = mpsc::unbounded_channel();
        *lock(&inner.outbound) = Some(tx);
        inner.state.set_connected();
        tracing::info!(url = %inner.config.url, "real-time channel connected");

        let end = match transport.send(Envelope::subscribe(&inner.config.topics)).await {
            Ok(()) => self.session_loop(transport.as_mut(), &mut outbound, &token).await,
            Err(e) => SessionEnd::Lost(e.to_string()),
        };

        match end {
            SessionEnd::Closed => {
                if let Err(e) = transport.disconnect().await {
                    tracing::debug!(error = %e, "error closing real-time connection");
                }
            }
            SessionEnd::Lost(reason) => {
                lock(&inner.outbound).take();
                tracing::warn!(error = %reason, "real-time connection lost");
                inner.ctx.notifier.notify(
                    "Real-time connection lost. Reconnecting...",
                    NotifyKind::Warning,
                );
                self.on_failure(reason, &token);
            }
        }
    }

    async fn session_loop(
        &self,
        transport: &mut dyn Transport,
        outbound: &mut mpsc::UnboundedReceiver<Envelope>,
        token: &CancellationToken,
    ) -> SessionEnd {
        let config = &self.inner.config;
        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                _ = token.cancelled() => return SessionEnd::Closed,

                Some(envelope) = outbound.recv() => {
                    if let Err(e) = transport.send(envelope).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }

                _ = heartbeat.tick() => {
                    if let Some(limit) = config.liveness_timeout {
                        let silent = last_inbound.elapsed();
                        if silent > limit {
                            return SessionEnd::Lost(format!(
                                "no traffic for {}ms",
                                silent.as_millis()
                            ));
                        }
                    }
                    if let Err(e) = transport.send(Envelope::ping()).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }

                frame = transport.recv() => match frame {
                    Ok(Some(envelope)) => {
                        last_inbound = Instant::now();
                        self.dispatch(&envelope);
                    }
                    Ok(None) => return SessionEnd::Lost("connection closed by server".into()),
                    Err(e) => return SessionEnd::Lost(e.to_string()),
                },
            }
        }
    }

    fn dispatch(&self, envelope: &Envelope) {
        let inner = &self.inner;
        let sink = lock(&inner.sink).clone();
        Dispatch {
            rules: &inner.rules,
            sink: sink.as_deref(),
            notifier: inner.ctx.notifier.as_ref(),
            listeners: &inner.listeners,
        }
        .handle(envelope);
    }

    /// Records a failed connect or lost session and schedules the next
    /// attempt, or gives up once the budget is spent.
    fn on_failure(&self, reason: String, token: &CancellationToken) {
        let inner = &self.inner;
        if token.is_cancelled() || inner.manual_close.load(Ordering::Acquire) {
            return;
        }
        inner.state.record_error(reason);
        let max = inner.config.max_reconnect_attempts;
        let give_up = inner.state.attempts() >= max;
        // Exhaustion is visible before observers see the state change.
        if give_up {
            inner.state.set_exhausted(true);
        }
        inner.state.set(ConnectionState::Disconnected);

        if give_up {
            let exhausted = Error::ChannelExhausted { attempts: max };
            tracing::warn!("{exhausted}");
            inner.ctx.notifier.notify(
                "Real-time updates unavailable. Refresh manually to see the latest data.",
                NotifyKind::Error,
            );
            return;
        }

        let attempt = inner.state.next_attempt();
        let delay = backoff_delay(inner.config.base_reconnect_interval, attempt);
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        let handle = inner.ctx.scheduler.schedule_after(delay, self.attempt_task(token.clone()));
        if let Some(previous) = lock(&inner.reconnect).replace(handle) {
            previous.cancel();
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
