// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.

use std::path::PathBuf;

/// Environment variable names read by the CLI.
pub mod vars {
    pub const OFFSYNC_STATE_DIR: &str = "OFFSYNC_STATE_DIR";
    pub const OFFSYNC_LOG: &str = "OFFSYNC_LOG";
}

/// Returns the value of `OFFSYNC_STATE_DIR` if set and non-empty.
pub fn state_dir() -> Option<PathBuf> {
    std::env::var_os(vars::OFFSYNC_STATE_DIR).filter(|v| !v.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
