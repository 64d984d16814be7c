// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Real-time channel to the server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ RealtimeChannel │────►│  Transport  │────►│   Server    │
//! │   (session)     │◄────│   (trait)   │◄────│             │
//! └─────────────────┘     └─────────────┘     └─────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌─────────────┐
//! │    Dispatch     │────►│  CacheSink  │  (invalidate / apply_update)
//! │ rules+listeners │     └─────────────┘
//! └─────────────────┘
//! ```
//!
//! The channel never writes to the durable store and never touches cache
//! entries except through [`CacheSink`](crate::cache::CacheSink).

mod client;
mod dispatch;
mod listeners;
mod state;
mod transport;

pub use client::{backoff_delay, ChannelConfig, RealtimeChannel, TransportFactory};
pub use dispatch::InvalidationRules;
pub use listeners::{EventListener, ListenerId, ListenerRegistry, ANY_EVENT};
pub use state::SharedChannelState;
pub use transport::{Transport, TransportError, TransportFuture, TransportResult, WebSocketTransport};

#[cfg(test)]
pub(crate) mod test_helpers;
