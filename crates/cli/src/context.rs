// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Collaborators shared by the queue, cache and channel.

use std::sync::Arc;

use offsync_core::{ClockSource, SystemClock};

use crate::executor::Executor;
use crate::notify::{Notifier, TracingNotifier};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::store::DurableStore;

/// External collaborators injected into the sync core.
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn DurableStore>,
    pub executor: Arc<dyn Executor>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn ClockSource>,
    pub scheduler: Arc<dyn Scheduler>,
}

impl SyncContext {
    /// Context with the production clock, scheduler and log notifier.
    pub fn new(store: Arc<dyn DurableStore>, executor: Arc<dyn Executor>) -> Self {
        SyncContext {
            store,
            executor,
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(TokioScheduler),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }
}
