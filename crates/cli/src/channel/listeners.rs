// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Ad-hoc subscribers to inbound event types.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use offsync_core::Envelope;

use crate::lock;

/// Event type that receives every inbound frame.
pub const ANY_EVENT: &str = "*";

/// Callback for one inbound frame.
pub type EventListener = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::add`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event type to listener set.
///
/// A type with no listeners left has no entry.
#[derive(Default)]
pub struct ListenerRegistry {
    next: AtomicU64,
    by_type: Mutex<HashMap<String, Vec<(ListenerId, EventListener)>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event_type: impl Into<String>, listener: EventListener) -> ListenerId {
        let id = ListenerId(self.next.fetch_add(1, Ordering::Relaxed));
        lock(&self.by_type).entry(event_type.into()).or_default().push((id, listener));
        id
    }

    /// Returns whether the listener was registered for `event_type`.
    pub fn remove(&self, event_type: &str, id: ListenerId) -> bool {
        let mut by_type = lock(&self.by_type);
        let Some(listeners) = by_type.get_mut(event_type) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            by_type.remove(event_type);
        }
        removed
    }

    /// Calls every listener for the frame's type in registration order,
    /// then the [`ANY_EVENT`] listeners. Returns how many were called.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        // Listeners run unlocked so they may add or remove listeners.
        let listeners: Vec<EventListener> = {
            let by_type = lock(&self.by_type);
            [envelope.kind.as_str(), ANY_EVENT]
                .into_iter()
                .filter_map(|kind| by_type.get(kind))
                .flatten()
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };
        for listener in &listeners {
            listener(envelope);
        }
        listeners.len()
    }

    pub fn has_listeners(&self, event_type: &str) -> bool {
        lock(&self.by_type).contains_key(event_type)
    }

    /// Event types with at least one listener.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = lock(&self.by_type).keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
#[path = "listeners_tests.rs"]
mod tests;
