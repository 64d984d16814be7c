// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Deferred task execution.
//!
//! Retry passes, reconnect backoff and background refetches all go through a
//! [`Scheduler`] so tests can drive them on paused tokio time instead of
//! real timers.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A unit of deferred work.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs tasks after a delay.
pub trait Scheduler: Send + Sync {
    /// Runs `task` once `delay` has elapsed, unless the handle is cancelled first.
    fn schedule_after(&self, delay: Duration, task: Task) -> TaskHandle;

    /// Runs `task` in the background as soon as possible.
    fn spawn(&self, task: Task) -> TaskHandle {
        self.schedule_after(Duration::ZERO, task)
    }
}

/// Cancel handle for a scheduled task.
///
/// Cancelling only prevents a task that has not started yet; a task that is
/// already running completes normally.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    pub fn new(token: CancellationToken) -> Self {
        TaskHandle { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Scheduler backed by the ambient tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) -> TaskHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    tracing::trace!("scheduled task cancelled before firing");
                }
                _ = tokio::time::sleep(delay) => task.await,
            }
        });

        TaskHandle::new(token)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
