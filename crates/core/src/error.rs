// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for offsync-core operations.
//!
//! The variants double as the failure taxonomy of the sync core: the Request
//! Queue decides whether to retry with [`Error::is_retryable`], the cache
//! surfaces [`Error::NoCachedData`] for offline misses, and the real-time
//! channel reports [`Error::ChannelExhausted`] once it stops reconnecting.

use thiserror::Error;

/// All possible errors that can occur in offsync operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    TransientNetwork(String),

    #[error("request timed out")]
    Timeout,

    #[error("request rejected ({status}): {message}")]
    ClientRejected { status: u16, message: String },

    #[error("server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("no cached data for '{0}' while offline")]
    NoCachedData(String),

    #[error("queue overflow: dropped {dropped} request(s) to stay within {max}")]
    QueueOverflow { dropped: usize, max: usize },

    #[error("real-time updates unavailable after {attempts} reconnect attempts\n  hint: refresh manually to load the latest data")]
    ChannelExhausted { attempts: u32 },

    #[error("request {0} was dropped before it was delivered")]
    Discarded(String),

    #[error("not connected to real-time server")]
    NotConnected,

    #[error("an optimistic update is already pending for '{0}'")]
    PatchInFlight(String),

    #[error("no pending optimistic update matches '{0}'")]
    UnknownPatch(String),

    #[error("invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Builds the error for a non-success transport status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400..=499 => Error::ClientRejected { status, message },
            _ => Error::ServerError { status, message },
        }
    }

    /// Whether a queued request that failed with this error should be retried.
    ///
    /// 5xx responses, network failures and timeouts are transient. 4xx
    /// rejections and local failures will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransientNetwork(_)
                | Error::Timeout
                | Error::ServerError { .. }
                | Error::Transport(_)
                | Error::NotConnected
        )
    }

    /// HTTP-like status code, if this error came from a server response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::ClientRejected { status, .. } | Error::ServerError { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// A specialized Result type for offsync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
