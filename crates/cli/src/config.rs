// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration.
//!
//! Configuration is stored in `<state-dir>/offsync.toml` (or the file given
//! with `--config`) and has four sections:
//! - `[queue]`: replay batching, retry delay and retry budget
//! - `[cache]`: TTLs per resource type and write-through persistence
//! - `[channel]`: real-time endpoint, topics, reconnect and heartbeat timing
//! - `[http]`: base URL, timeout and bearer token for the executor
//!
//! Every field has a default, so a missing file is a valid configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, TtlPolicy};
use crate::channel::{ChannelConfig, InvalidationRules};
use crate::error::{Error, Result};
use crate::queue::QueueConfig;

pub const CONFIG_FILE_NAME: &str = "offsync.toml";
const STATE_DIR_NAME: &str = "offsync";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub channel: ChannelSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,
    /// Per-resource TTLs. Entries here override the built-in ones.
    #[serde(default = "default_ttl_table")]
    pub ttl_ms: BTreeMap<String, u64>,
    #[serde(default = "default_true")]
    pub persist: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// `ws://` or `wss://` endpoint. The channel is off without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    #[serde(default = "default_base_reconnect_interval_ms")]
    pub base_reconnect_interval_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Force a reconnect after this long without inbound traffic. Off by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_timeout_ms: Option<u64>,
    /// Event type to key patterns. Replaces the built-in patterns for that type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub invalidate: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_max_queue_size() -> usize {
    100
}

fn default_batch_size() -> usize {
    5
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_ttl_ms() -> u64 {
    300_000
}

fn default_ttl_table() -> BTreeMap<String, u64> {
    [
        ("analytics", 60_000),
        ("dashboard", 120_000),
        ("settings", 3_600_000),
        ("theme", 86_400_000),
    ]
    .into_iter()
    .map(|(resource, ms)| (resource.to_string(), ms))
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_topics() -> Vec<String> {
    vec!["revenue".to_string(), "conversions".to_string(), "notifications".to_string()]
}

fn default_base_reconnect_interval_ms() -> u64 {
    5_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_ping_interval_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            max_queue_size: default_max_queue_size(),
            batch_size: default_batch_size(),
            retry_delay_ms: default_retry_delay_ms(),
            default_max_retries: default_max_retries(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            default_ttl_ms: default_ttl_ms(),
            ttl_ms: default_ttl_table(),
            persist: default_true(),
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        ChannelSettings {
            url: None,
            token: None,
            topics: default_topics(),
            base_reconnect_interval_ms: default_base_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            ping_interval_ms: default_ping_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            liveness_timeout_ms: None,
            invalidate: BTreeMap::new(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings { base_url: None, timeout_ms: default_timeout_ms(), token: None }
    }
}

impl QueueSettings {
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_queue_size: self.max_queue_size,
            batch_size: self.batch_size,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            default_max_retries: self.default_max_retries,
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        let mut table = default_ttl_table();
        table.extend(self.ttl_ms.iter().map(|(k, v)| (k.clone(), *v)));
        let ttl = table.into_iter().fold(
            TtlPolicy::new(Duration::from_millis(self.default_ttl_ms)),
            |policy, (resource, ms)| policy.with(resource, Duration::from_millis(ms)),
        );
        CacheConfig { ttl, persist: self.persist }
    }
}

impl ChannelSettings {
    /// Channel configuration, or `None` when no URL is set.
    pub fn to_channel_config(&self) -> Option<ChannelConfig> {
        let url = self.url.as_ref()?;
        Some(ChannelConfig {
            url: url.clone(),
            token: self.token.clone(),
            topics: self.topics.clone(),
            base_reconnect_interval: Duration::from_millis(self.base_reconnect_interval_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            liveness_timeout: self.liveness_timeout_ms.map(Duration::from_millis),
        })
    }

    /// Built-in invalidation rules with the configured overrides applied.
    pub fn rules(&self) -> Result<InvalidationRules> {
        Ok(InvalidationRules::builtin().with_overrides(&self.invalidate)?)
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Loads the config file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(e) => return Err(Error::Config(format!("failed to read {}: {}", path.display(), e))),
        };
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.queue.batch_size == 0 {
            return Err(Error::Config("queue.batch_size must be at least 1".to_string()));
        }
        if self.queue.max_queue_size == 0 {
            return Err(Error::Config("queue.max_queue_size must be at least 1".to_string()));
        }
        if let Some(url) = &self.channel.url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(Error::Config(format!(
                    "invalid channel url '{url}': must be ws:// or wss://"
                )));
            }
        }
        self.channel.rules()?;
        Ok(())
    }
}

/// Resolves the state directory: `--state-dir`, then `OFFSYNC_STATE_DIR`,
/// then the platform state dir, then `~/.local/state`.
pub fn resolve_state_dir(flag: Option<&Path>) -> Result<PathBuf> {
    state_dir_from(flag, crate::env::state_dir(), dirs::state_dir(), dirs::home_dir())
}

fn state_dir_from(
    flag: Option<&Path>,
    env: Option<PathBuf>,
    platform: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = env {
        return Ok(dir);
    }
    if let Some(dir) = platform {
        return Ok(dir.join(STATE_DIR_NAME));
    }
    home.map(|h| h.join(".local/state").join(STATE_DIR_NAME)).ok_or(Error::NoStateDir)
}

/// Config file location: `--config`, else `<state-dir>/offsync.toml`.
pub fn config_path(flag: Option<&Path>, state_dir: &Path) -> PathBuf {
    match flag {
        Some(path) => path.to_path_buf(),
        None => state_dir.join(CONFIG_FILE_NAME),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
