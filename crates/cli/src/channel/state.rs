// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection state shared between the channel handle and its session task.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;

use offsync_core::{ChannelStatus, ConnectionState};
use tokio::sync::watch;

use crate::lock;

/// Lock-free reads of the connection state, plus a watch channel so callers
/// can await transitions.
pub struct SharedChannelState {
    state: AtomicU8,
    attempts: AtomicU32,
    exhausted: AtomicBool,
    last_error: Mutex<Option<String>>,
    changes: watch::Sender<ConnectionState>,
}

impl SharedChannelState {
    pub fn new() -> Self {
        SharedChannelState {
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            attempts: AtomicU32::new(0),
            exhausted: AtomicBool::new(false),
            last_error: Mutex::new(None),
            changes: watch::Sender::new(ConnectionState::Disconnected),
        }
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ConnectionState) {
        let previous = self.state.swap(state.as_u8(), Ordering::AcqRel);
        if previous != state.as_u8() {
            self.changes.send_replace(state);
        }
    }

    /// A successful open: attempts reset, error and exhaustion cleared.
    pub fn set_connected(&self) {
        self.attempts.store(0, Ordering::Release);
        self.exhausted.store(false, Ordering::Release);
        *lock(&self.last_error) = None;
        self.set(ConnectionState::Connected);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Counts one more reconnect attempt and returns the new total.
    pub fn next_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    pub fn set_exhausted(&self, exhausted: bool) {
        self.exhausted.store(exhausted, Ordering::Release);
    }

    pub fn record_error(&self, error: impl Into<String>) {
        *lock(&self.last_error) = Some(error.into());
    }

    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            state: self.get(),
            reconnect_attempts: self.attempts(),
            last_error: lock(&self.last_error).clone(),
            exhausted: self.is_exhausted(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.changes.subscribe()
    }
}

impl Default for SharedChannelState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
