// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! offsync - offline-first synchronization runtime.
//!
//! This crate provides the runtime half of the sync core and the `offsync`
//! command-line tool:
//!
//! - [`RequestQueue`] - durable, priority-ordered queue of deferred mutations
//! - [`SyncCache`] - read-through cache with TTLs, invalidation and optimistic patches
//! - [`RealtimeChannel`] - reconnecting WebSocket channel that drives invalidation
//! - [`SyncEngine`] - wires the three together behind one connectivity signal
//! - [`Config`] - TOML configuration for all of the above
//!
//! Transport-free types (requests, keys, envelopes, errors) live in
//! [`offsync_core`].
//!
//! ```rust,ignore
//! use offsync::{Config, SyncContext, SyncEngine, FileStore, HttpExecutor};
//!
//! let store = FileStore::open(&state_dir.join("store"))?;
//! let executor = HttpExecutor::new("https://api.example.com", timeout, None)?;
//! let engine = SyncEngine::new(&config, SyncContext::new(Arc::new(store), Arc::new(executor))).await?;
//! engine.start(connectivity_rx);
//! ```

pub mod cache;
pub mod channel;
mod cli;
mod commands;
pub mod config;
pub mod context;
pub mod engine;
pub mod env;
pub mod error;
pub mod executor;
pub mod notify;
pub mod queue;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod test_helpers;

pub use cache::{CacheConfig, CacheSink, ReadOptions, SyncCache, TtlPolicy};
pub use channel::{ChannelConfig, InvalidationRules, RealtimeChannel};
pub use cli::{Cli, Command, EnqueueArgs};
pub use config::Config;
pub use context::SyncContext;
pub use engine::{MutationOutcome, SyncEngine};
pub use error::{Error, Result};
pub use executor::{Executor, HttpExecutor};
pub use notify::{Notifier, NotifyKind, TracingNotifier};
pub use queue::{PassSummary, QueueConfig, RequestQueue};
pub use scheduler::{Scheduler, TaskHandle, TokioScheduler};
pub use store::{DurableStore, FileStore, MemoryStore};

use commands::Session;
use tracing_subscriber::EnvFilter;

/// Locks a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Installs the stderr log subscriber. `OFFSYNC_LOG` holds the filter
/// (default `warn`).
pub fn setup_logging() {
    let filter = std::env::var(env::vars::OFFSYNC_LOG)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Execute a CLI invocation. This is the main entry point for library users
/// and provides a testable way to run commands without process execution.
pub fn run(cli: Cli) -> Result<()> {
    let session = Session::open(cli.state_dir.as_deref(), cli.config.as_deref())?;
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Io(std::io::Error::other(format!("tokio: {e}"))))?;

    rt.block_on(async {
        match cli.command {
            Command::Status { json } => commands::status::run(&session, json).await,
            Command::Enqueue(args) => commands::enqueue::run(&session, args).await,
            Command::Replay => commands::replay::run(&session).await,
            Command::RetryFailed => commands::maintain::retry_failed(&session).await,
            Command::Remove { id } => commands::maintain::remove(&session, &id).await,
            Command::Clear => commands::maintain::clear(&session).await,
            Command::Watch { topics } => commands::watch::run(&session, topics).await,
        }
    })
}
