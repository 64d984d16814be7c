// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test doubles for the sync core.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use offsync_core::{Error, KeyPattern, ManualClock, QueryKey, Result};
use serde_json::Value;

use crate::cache::CacheSink;
use crate::context::SyncContext;
use crate::executor::{ExecuteFuture, ExecuteRequest, Executor};
use crate::notify::{Notifier, NotifyKind};
use crate::scheduler::TokioScheduler;
use crate::store::{DurableStore, MemoryStore, StoreFuture};

/// Scripted result for one [`MockExecutor`] call.
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok(Value),
    Status(u16),
    Network,
}

impl Outcome {
    fn into_result(self) -> Result<Value> {
        match self {
            Outcome::Ok(value) => Ok(value),
            Outcome::Status(status) => Err(Error::from_status(status, "scripted failure")),
            Outcome::Network => Err(Error::TransientNetwork("connection reset".into())),
        }
    }
}

/// Executor that records calls and replays scripted outcomes.
pub struct MockExecutor {
    calls: Mutex<Vec<ExecuteRequest>>,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Outcome>,
    delay: Mutex<Option<Duration>>,
}

impl MockExecutor {
    /// Every call succeeds with `null` unless scripted otherwise.
    pub fn new() -> Arc<Self> {
        Arc::new(MockExecutor {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Outcome::Ok(Value::Null)),
            delay: Mutex::new(None),
        })
    }

    /// Queues the outcome of the next unscripted call.
    pub fn push(&self, outcome: Outcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Outcome for calls once the script runs out.
    pub fn set_fallback(&self, outcome: Outcome) {
        *self.fallback.lock().unwrap() = outcome;
    }

    /// Makes every call take `delay` of (virtual) time.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<ExecuteRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn targets(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.target).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Executor for MockExecutor {
    fn execute(&self, request: ExecuteRequest) -> ExecuteFuture<'_> {
        self.calls.lock().unwrap().push(request);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        let delay = *self.delay.lock().unwrap();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            outcome.into_result()
        })
    }
}

/// Notifier that keeps every message.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, NotifyKind)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<(String, NotifyKind)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: NotifyKind) -> Vec<String> {
        self.messages().into_iter().filter(|(_, k)| *k == kind).map(|(m, _)| m).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, kind: NotifyKind) {
        self.messages.lock().unwrap().push((message.to_string(), kind));
    }
}

/// Cache sink that records what it was asked to do.
#[derive(Default)]
pub struct RecordingSink {
    invalidated: Mutex<Vec<String>>,
    updates: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, Value)> {
        self.updates.lock().unwrap().clone()
    }
}

impl CacheSink for RecordingSink {
    fn invalidate(&self, pattern: &KeyPattern) {
        self.invalidated.lock().unwrap().push(pattern.to_string());
    }

    fn apply_update(&self, key: &QueryKey, data: Value) {
        self.updates.lock().unwrap().push((key.to_string(), data));
    }
}

/// A context wired to test doubles, with handles kept for assertions.
pub struct Harness {
    pub ctx: SyncContext,
    pub store: Arc<MemoryStore>,
    pub executor: Arc<MockExecutor>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Shares `store` so a second harness can observe what the first persisted.
    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        let executor = MockExecutor::new();
        let notifier = RecordingNotifier::new();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ctx = SyncContext::new(store.clone(), executor.clone())
            .with_notifier(notifier.clone())
            .with_clock(clock.clone())
            .with_scheduler(Arc::new(TokioScheduler));
        Harness { ctx, store, executor, notifier, clock }
    }

    /// This harness's context persisting through `store` instead.
    pub fn ctx_with_store(&self, store: Arc<dyn DurableStore>) -> SyncContext {
        SyncContext { store, ..self.ctx.clone() }
    }
}

/// Memory store whose writes fail on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn failing(&self) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
    }
}

impl DurableStore for FlakyStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        self.inner.get(key)
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
        if self.failing() {
            return Box::pin(async { Err::<(), _>(Error::Store("disk full".into())) });
        }
        self.inner.set(key, value)
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        self.inner.remove(key)
    }

    fn remove_many<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, ()> {
        self.inner.remove_many(keys)
    }

    fn keys<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        self.inner.keys(prefix)
    }
}

/// Lets spawned tasks run on paused time without moving the clock far.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
