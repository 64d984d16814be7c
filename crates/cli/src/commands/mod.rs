// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod enqueue;
pub mod maintain;
pub mod replay;
pub mod status;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use offsync_core::Error as CoreError;

use crate::config::{config_path, resolve_state_dir, Config};
use crate::context::SyncContext;
use crate::error::{Error, Result};
use crate::executor::{ExecuteFuture, ExecuteRequest, Executor, HttpExecutor};
use crate::queue::RequestQueue;
use crate::store::FileStore;

/// Subdirectory of the state dir holding the durable store.
const STORE_DIR: &str = "store";

/// Resolved state directory and configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Session {
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub config: Config,
}

impl Session {
    pub fn open(state_dir: Option<&Path>, config: Option<&Path>) -> Result<Self> {
        let state_dir = resolve_state_dir(state_dir)?;
        let config_path = config_path(config, &state_dir);
        let config = Config::load(&config_path)?;
        tracing::debug!(
            state_dir = %state_dir.display(),
            config = %config_path.display(),
            "session opened"
        );
        Ok(Session { state_dir, config_path, config })
    }

    pub fn store(&self) -> Result<FileStore> {
        Ok(FileStore::open(&self.state_dir.join(STORE_DIR))?)
    }

    /// Context for commands that never reach the server.
    pub fn offline_context(&self) -> Result<SyncContext> {
        Ok(SyncContext::new(Arc::new(self.store()?), Arc::new(Unreachable)))
    }

    /// Context that delivers requests to `[http] base_url`.
    pub fn http_context(&self) -> Result<SyncContext> {
        let http = &self.config.http;
        let base_url = http
            .base_url
            .as_deref()
            .ok_or_else(|| Error::NoBaseUrl(self.config_path.display().to_string()))?;
        let executor = HttpExecutor::new(base_url, http.timeout(), http.token.clone())?;
        Ok(SyncContext::new(Arc::new(self.store()?), Arc::new(executor)))
    }

    pub async fn open_queue(&self, ctx: SyncContext) -> Result<RequestQueue> {
        Ok(RequestQueue::open(self.config.queue.to_queue_config(), ctx).await?)
    }
}

/// Executor for offline commands. The queue stays offline, so it is never called.
struct Unreachable;

impl Executor for Unreachable {
    fn execute(&self, request: ExecuteRequest) -> ExecuteFuture<'_> {
        Box::pin(async move {
            Err(CoreError::TransientNetwork(format!(
                "offline: {} {} not sent",
                request.method, request.target
            )))
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
