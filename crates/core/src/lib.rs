// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! offsync-core: data model for the offsync synchronization core
//!
//! This crate provides the transport-free pieces shared by the runtime and
//! the command line: the failure taxonomy, queued request model and replay
//! ordering, cache keys, and the real-time wire format.

pub mod clock;
pub mod error;
pub mod key;
pub mod protocol;
pub mod request;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use key::{KeyPattern, QueryKey};
pub use protocol::{ChannelStatus, ConnectionState, Envelope, ServerEvent};
pub use request::{
    Method, NewRequest, Priority, QueueStatus, QueuedRequest, RequestId, RequestMetadata,
};
