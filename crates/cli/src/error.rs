// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// All possible errors that can occur in the offsync runtime and CLI.
///
/// Errors provide user-friendly messages with hints for common issues.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] offsync_core::Error),

    #[error("request not found: {0}\n  hint: run 'offsync status' to list queued requests")]
    RequestNotFound(String),

    #[error("no base URL configured\n  hint: set [http] base_url in {0}")]
    NoBaseUrl(String),

    #[error("no real-time URL configured\n  hint: set [channel] url in {0}")]
    NoChannelUrl(String),

    #[error("invalid payload: {0}\n  hint: --payload must be a JSON document")]
    InvalidPayload(String),

    #[error("cannot determine state directory\n  hint: pass --state-dir or set OFFSYNC_STATE_DIR")]
    NoStateDir,

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("http client error: {0}")]
    HttpClient(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for offsync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
