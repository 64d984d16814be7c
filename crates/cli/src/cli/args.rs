// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Argument structs for commands with many options.

use clap::Args;
use offsync_core::{Method, Priority};

#[derive(Args, Clone, Debug)]
pub struct EnqueueArgs {
    /// GET, POST, PUT, PATCH or DELETE
    pub method: Method,

    /// Path relative to [http] base_url
    pub target: String,

    /// JSON body
    #[arg(long)]
    pub payload: Option<String>,

    /// high, normal or low
    #[arg(long, short, default_value = "normal")]
    pub priority: Priority,

    /// Retries after the first attempt (default: [queue] default_max_retries)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Label used in notifications
    #[arg(long, short)]
    pub description: Option<String>,
}
