// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Routing of inbound events into cache invalidations.
//!
//! | event              | invalidates                                              |
//! |--------------------|----------------------------------------------------------|
//! | `revenue_update`   | `analytics:revenue*`, `dashboard*`                       |
//! | `new_conversion`   | `analytics:conversions*`, `analytics:revenue*`, `dashboard*` |
//! | `notification`     | `notifications*` (and the message goes to the notifier)  |
//! | `resource_update`  | `<resource>*`, plus a direct update of `<resource>?id=<id>` |

use std::collections::BTreeMap;

use offsync_core::protocol::{NEW_CONVERSION, NOTIFICATION, REVENUE_UPDATE};
use offsync_core::{Envelope, KeyPattern, QueryKey, Result, ServerEvent};

use super::listeners::ListenerRegistry;
use crate::cache::CacheSink;
use crate::notify::{Notifier, NotifyKind};

/// Event type to the key patterns it invalidates.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidationRules {
    rules: BTreeMap<String, Vec<KeyPattern>>,
}

impl InvalidationRules {
    pub fn builtin() -> Self {
        let table: [(&str, &[&str]); 3] = [
            (REVENUE_UPDATE, &["analytics:revenue*", "dashboard*"]),
            (NEW_CONVERSION, &["analytics:conversions*", "analytics:revenue*", "dashboard*"]),
            (NOTIFICATION, &["notifications*"]),
        ];
        let mut rules = BTreeMap::new();
        for (event, patterns) in table {
            // Built-in globs are literals known to compile.
            let compiled = patterns.iter().filter_map(|p| KeyPattern::new(p).ok()).collect();
            rules.insert(event.to_string(), compiled);
        }
        InvalidationRules { rules }
    }

    /// Rules with no entries at all.
    pub fn empty() -> Self {
        InvalidationRules { rules: BTreeMap::new() }
    }

    /// Replaces the patterns for each listed event type; unlisted types keep
    /// their current rules and new types are added.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        for (event, patterns) in overrides {
            let compiled =
                patterns.iter().map(|p| KeyPattern::new(p)).collect::<Result<Vec<_>>>()?;
            self.rules.insert(event.clone(), compiled);
        }
        Ok(self)
    }

    pub fn patterns_for(&self, event_type: &str) -> &[KeyPattern] {
        self.rules.get(event_type).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for InvalidationRules {
    fn default() -> Self {
        Self::builtin()
    }
}

fn notify_kind(level: Option<&str>) -> NotifyKind {
    match level {
        Some("error") => NotifyKind::Error,
        Some("warning" | "warn") => NotifyKind::Warning,
        Some("success") => NotifyKind::Success,
        _ => NotifyKind::Info,
    }
}

/// Collaborators an inbound frame is routed to.
pub(crate) struct Dispatch<'a> {
    pub rules: &'a InvalidationRules,
    pub sink: Option<&'a dyn CacheSink>,
    pub notifier: &'a dyn Notifier,
    pub listeners: &'a ListenerRegistry,
}

impl Dispatch<'_> {
    /// Routes one frame: built-in handling first, then ad-hoc listeners.
    pub fn handle(&self, envelope: &Envelope) {
        let mut handled = true;
        match ServerEvent::classify(envelope) {
            ServerEvent::Pong => tracing::trace!("pong"),
            ServerEvent::Notification(notification) => {
                self.notifier.notify(&notification.message, notify_kind(notification.level.as_deref()));
            }
            ServerEvent::ResourceUpdate(update) => {
                match KeyPattern::new(&format!("{}*", update.resource)) {
                    Ok(pattern) => self.invalidate(&pattern),
                    Err(e) => tracing::warn!(error = %e, "skipping resource invalidation"),
                }
                if let (Some(id), Some(data)) = (update.id, update.data) {
                    if let Some(sink) = self.sink {
                        sink.apply_update(&QueryKey::new(update.resource).param("id", id), data);
                    }
                }
            }
            ServerEvent::RevenueUpdate(_) | ServerEvent::NewConversion(_) => {}
            ServerEvent::Other(_) => handled = false,
        }

        let patterns = self.rules.patterns_for(&envelope.kind);
        for pattern in patterns {
            self.invalidate(pattern);
        }
        let listened = self.listeners.dispatch(envelope);

        if !handled && patterns.is_empty() && listened == 0 {
            tracing::debug!(kind = %envelope.kind, "ignoring unknown event type");
        }
    }

    fn invalidate(&self, pattern: &KeyPattern) {
        if let Some(sink) = self.sink {
            sink.invalidate(pattern);
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
