// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

mod args;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use args::EnqueueArgs;

#[derive(Parser, Debug)]
#[command(name = "offsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline-first request queue, cache and real-time sync")]
#[command(
    long_about = "Offline-first request queue, cache and real-time sync.\n\n\
    Mutations are queued durably while offline and replayed in priority order \
    once the server is reachable."
)]
pub struct Cli {
    /// Directory holding the queue, cache and config
    #[arg(long, global = true, value_name = "path")]
    pub state_dir: Option<PathBuf>,

    /// Config file (default: <state-dir>/offsync.toml)
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show queue counters and queued requests
    #[command(after_help = "\
Examples:
  offsync status            Counters and one line per request
  offsync status --json     Machine-readable status")]
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Queue a request for later delivery (no network access)
    #[command(after_help = "\
Examples:
  offsync enqueue POST /campaigns --payload '{\"name\":\"Spring\"}'
  offsync enqueue DELETE /campaigns/7 --priority high
  offsync enqueue PATCH /settings --max-retries 5 --description \"Save settings\"")]
    Enqueue(EnqueueArgs),

    /// Deliver queued requests until nothing eligible remains
    Replay,

    /// Give failed requests a fresh retry budget
    RetryFailed,

    /// Remove one queued request
    Remove {
        /// Request id (see `offsync status`)
        id: String,
    },

    /// Remove every queued request
    Clear,

    /// Connect the real-time channel and print events until interrupted
    #[command(after_help = "\
Examples:
  offsync watch                         Subscribe to the configured topics
  offsync watch --topic revenue         Subscribe to one topic only")]
    Watch {
        /// Topic to subscribe to (repeatable; overrides the config)
        #[arg(long = "topic", value_name = "topic")]
        topics: Vec<String>,
    },
}

#[cfg(test)]
#[path = "../cli_tests/mod.rs"]
mod tests;
