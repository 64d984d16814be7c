// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Network-aware synchronization cache.
//!
//! Reads are served from memory (or the durable store after a restart) while
//! fresh. Stale entries are returned immediately and refetched in the
//! background; offline, stale data is returned as-is and no fetch is made.
//!
//! Every key carries a generation counter. Optimistic patches, pushed
//! updates and removals bump it, and a fetch that started under an older
//! generation has its result discarded, so a slow response can never
//! overwrite a newer local value.
//!
//! Invalidations are counted per key as well. A fetch remembers the count
//! when its request goes out; if an invalidation arrived meanwhile, its
//! result lands still marked invalidated and a background refetch runs once
//! more.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use offsync_core::{Error, KeyPattern, QueryKey, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::SyncContext;
use crate::lock;
use crate::store::{cache_key, CACHE_PREFIX};

/// Boxed future produced by a [`Fetcher`].
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Loads the server value for one key. Called again for every refetch.
pub type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

/// Wraps a closure returning a future into a [`Fetcher`].
pub fn fetcher<F, Fut>(f: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as FetchFuture)
}

/// The only cache surface the real-time channel and request queue see.
pub trait CacheSink: Send + Sync {
    /// Marks matching entries stale and refetches the watched ones.
    fn invalidate(&self, pattern: &KeyPattern);

    /// Replaces a key's value with server-pushed data.
    fn apply_update(&self, key: &QueryKey, data: Value);
}

/// Per-resource time-to-live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    default: Duration,
    by_resource: BTreeMap<String, Duration>,
}

impl TtlPolicy {
    pub fn new(default: Duration) -> Self {
        TtlPolicy { default, by_resource: BTreeMap::new() }
    }

    pub fn with(mut self, resource: impl Into<String>, ttl: Duration) -> Self {
        self.by_resource.insert(resource.into(), ttl);
        self
    }

    /// TTL for a key, looked up by its resource type.
    pub fn ttl_for(&self, key: &QueryKey) -> Duration {
        self.by_resource.get(key.resource_type()).copied().unwrap_or(self.default)
    }
}

impl Default for TtlPolicy {
    /// Short TTLs for fast-moving analytics, long ones for settings and theme.
    fn default() -> Self {
        TtlPolicy::new(Duration::from_millis(300_000))
            .with("analytics", Duration::from_millis(60_000))
            .with("dashboard", Duration::from_millis(120_000))
            .with("settings", Duration::from_millis(3_600_000))
            .with("theme", Duration::from_millis(86_400_000))
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: TtlPolicy,
    /// Write fetched and committed values through to the durable store.
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { ttl: TtlPolicy::default(), persist: true }
    }
}

/// Per-read overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Overrides the policy TTL for this key.
    pub ttl: Option<Duration>,
    /// Fetch even if the cached value is fresh. Ignored offline.
    pub force_refresh: bool,
}

/// One cached read result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    pub fetched_at_ms: u64,
    pub ttl_ms: u64,
    /// Set by invalidation; cleared when a fresh value lands.
    #[serde(default)]
    pub invalidated: bool,
}

impl CacheEntry {
    pub fn stale_after_ms(&self) -> u64 {
        self.fetched_at_ms.saturating_add(self.ttl_ms)
    }

    pub fn is_stale(&self, now_ms: u64) -> bool {
        self.invalidated || now_ms >= self.stale_after_ms()
    }
}

/// Handle for an outstanding optimistic patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "an optimistic patch must be committed or rolled back"]
pub struct PatchHandle {
    key: QueryKey,
    id: u64,
}

impl PatchHandle {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

struct Patch {
    id: u64,
    previous: Option<CacheEntry>,
}

struct Watcher {
    fetcher: Fetcher,
    ttl: Duration,
    views: usize,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, CacheEntry>,
    generations: HashMap<String, u64>,
    /// Invalidation count per key that has had a fetch issued.
    invalidations: HashMap<String, u64>,
    in_flight: HashSet<String>,
    patches: HashMap<String, Patch>,
    watchers: HashMap<String, Watcher>,
}

impl State {
    fn generation(&self, key: &str) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &str) {
        *self.generations.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Current invalidation count, tracking the key from now on.
    fn invalidation_mark(&mut self, key: &str) -> u64 {
        *self.invalidations.entry(key.to_string()).or_insert(0)
    }
}

/// Read-through cache with optimistic updates.
///
/// Cloning is cheap; clones share the same cache.
#[derive(Clone)]
pub struct SyncCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    config: CacheConfig,
    ctx: SyncContext,
    state: Mutex<State>,
    online: AtomicBool,
    next_patch: AtomicU64,
}

impl CacheInner {
    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    async fn persist_entry(&self, key: &str, entry: &CacheEntry) {
        if !self.config.persist {
            return;
        }
        let result = match serde_json::to_string(entry) {
            Ok(json) => self.ctx.store.set(&cache_key(key), json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "failed to persist cache entry");
        }
    }

    async fn unpersist(&self, key: &str) {
        if !self.config.persist {
            return;
        }
        if let Err(e) = self.ctx.store.remove(&cache_key(key)).await {
            tracing::warn!(key, error = %e, "failed to remove persisted cache entry");
        }
    }
}

impl SyncCache {
    /// Creates a cache. It starts offline.
    pub fn new(config: CacheConfig, ctx: SyncContext) -> Self {
        SyncCache {
            inner: Arc::new(CacheInner {
                config,
                ctx,
                state: Mutex::new(State::default()),
                online: AtomicBool::new(false),
                next_patch: AtomicU64::new(1),
            }),
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::Acquire)
    }

    fn ttl_for(&self, key: &QueryKey, options: &ReadOptions) -> Duration {
        options.ttl.unwrap_or_else(|| self.inner.config.ttl.ttl_for(key))
    }

    fn now_ms(&self) -> u64 {
        self.inner.ctx.clock.now_ms()
    }

    /// Reads a key through the cache.
    ///
    /// - fresh hit: returned as-is
    /// - stale hit: returned immediately, refetched in the background when online
    /// - miss: fetched and stored when online, [`Error::NoCachedData`] offline
    pub async fn read(&self, key: &QueryKey, fetcher: Fetcher, options: ReadOptions) -> Result<Value> {
        let rendered = key.to_string();
        let ttl = self.ttl_for(key, &options);
        let in_memory = self.inner.state().entries.get(&rendered).cloned();
        let cached = match in_memory {
            Some(entry) => Some(entry),
            None => self.hydrate(&rendered).await,
        };

        let Some(entry) = cached else {
            if !self.is_online() {
                return Err(Error::NoCachedData(rendered));
            }
            return self.fetch_and_store(&rendered, fetcher, ttl).await;
        };

        if !self.is_online() {
            return Ok(entry.data);
        }
        if options.force_refresh && !self.has_pending_patch(key) {
            return match self.fetch_and_store(&rendered, fetcher, ttl).await {
                Ok(value) => Ok(value),
                Err(e) => {
                    tracing::warn!(key = %rendered, error = %e, "refresh failed, serving cached data");
                    Ok(entry.data)
                }
            };
        }

        let ttl_ms = options.ttl.map(|t| t.as_millis() as u64).unwrap_or(entry.ttl_ms);
        let stale = entry.invalidated || self.now_ms() >= entry.fetched_at_ms.saturating_add(ttl_ms);
        if stale {
            self.revalidate(&rendered, fetcher, ttl);
        }
        Ok(entry.data)
    }

    /// Typed variant of [`SyncCache::read`].
    pub async fn read_as<T: DeserializeOwned>(
        &self,
        key: &QueryKey,
        fetcher: Fetcher,
        options: ReadOptions,
    ) -> Result<T> {
        let value = self.read(key, fetcher, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn hydrate(&self, key: &str) -> Option<CacheEntry> {
        if !self.inner.config.persist {
            return None;
        }
        let json = match self.inner.ctx.store.get(&cache_key(key)).await {
            Ok(json) => json?,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to load persisted cache entry");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_str(&json) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring corrupt persisted cache entry");
                return None;
            }
        };
        let mut state = self.inner.state();
        Some(state.entries.entry(key.to_string()).or_insert(entry).clone())
    }

    async fn fetch_and_store(&self, key: &str, fetcher: Fetcher, ttl: Duration) -> Result<Value> {
        let (generation, mark) = {
            let mut state = self.inner.state();
            (state.generation(key), state.invalidation_mark(key))
        };
        let value = fetcher().await?;
        match self.store_if_current(key, generation, mark, value.clone(), ttl) {
            Some(entry) => {
                self.inner.persist_entry(key, &entry).await;
                Ok(value)
            }
            None => {
                tracing::debug!(key, "discarding superseded fetch result");
                Ok(self.inner.state().entries.get(key).map(|e| e.data.clone()).unwrap_or(value))
            }
        }
    }

    /// Stores a fetch result unless the key moved on since the fetch began.
    /// The entry stays invalidated if an invalidation arrived after `mark`
    /// was taken.
    fn store_if_current(
        &self,
        key: &str,
        generation: u64,
        mark: u64,
        data: Value,
        ttl: Duration,
    ) -> Option<CacheEntry> {
        let mut state = self.inner.state();
        if state.generation(key) != generation || state.patches.contains_key(key) {
            return None;
        }
        let invalidated = state.invalidation_mark(key) != mark;
        let entry = CacheEntry {
            data,
            fetched_at_ms: self.now_ms(),
            ttl_ms: ttl.as_millis() as u64,
            invalidated,
        };
        state.entries.insert(key.to_string(), entry.clone());
        Some(entry)
    }

    /// Starts a background refetch unless one is already in flight or a
    /// patch is outstanding for the key. A refetch whose result lands
    /// invalidated starts exactly one more.
    fn revalidate(&self, key: &str, fetcher: Fetcher, ttl: Duration) {
        let generation = {
            let mut state = self.inner.state();
            if state.patches.contains_key(key) || !state.in_flight.insert(key.to_string()) {
                return;
            }
            state.generation(key)
        };
        tracing::debug!(key, "revalidating in background");

        let cache = self.clone();
        let key = key.to_string();
        self.inner.ctx.scheduler.spawn(Box::pin(async move {
            let mark = cache.inner.state().invalidation_mark(&key);
            let result = fetcher().await;
            cache.inner.state().in_flight.remove(&key);
            match result {
                Ok(value) => match cache.store_if_current(&key, generation, mark, value, ttl) {
                    Some(entry) => {
                        cache.inner.persist_entry(&key, &entry).await;
                        if entry.invalidated && cache.is_online() {
                            tracing::debug!(key = %key, "invalidated during refetch, fetching again");
                            cache.revalidate(&key, fetcher, ttl);
                        }
                    }
                    None => tracing::debug!(key = %key, "discarding superseded refetch"),
                },
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "background refetch failed, keeping stale data")
                }
            }
        }));
    }

    /// Whether a background refetch is running for the key.
    pub fn is_refetching(&self, key: &QueryKey) -> bool {
        self.inner.state().in_flight.contains(&key.to_string())
    }

    /// Registers an active view of `key`. While any guard for the key is
    /// alive, invalidation and reconnect trigger a refetch through `fetcher`.
    pub fn watch(&self, key: &QueryKey, fetcher: Fetcher) -> WatchGuard {
        let rendered = key.to_string();
        let ttl = self.inner.config.ttl.ttl_for(key);
        let mut state = self.inner.state();
        state
            .watchers
            .entry(rendered.clone())
            .and_modify(|w| {
                w.views += 1;
                w.fetcher = Arc::clone(&fetcher);
            })
            .or_insert(Watcher { fetcher, ttl, views: 1 });
        WatchGuard { cache: Arc::downgrade(&self.inner), key: rendered }
    }

    /// Marks every entry matching `pattern` stale, refetching watched keys
    /// when online.
    ///
    /// A key whose refetch is queued but not yet issued is not fetched
    /// twice. One whose request is already out gets a single follow-up
    /// refetch once that request lands.
    pub fn invalidate(&self, pattern: &KeyPattern) {
        let (to_refetch, to_persist) = {
            let mut state = self.inner.state();
            for (key, mark) in state.invalidations.iter_mut() {
                if pattern.matches(key) {
                    *mark += 1;
                }
            }
            let mut to_persist = Vec::new();
            for (key, entry) in state.entries.iter_mut() {
                if pattern.matches(key) && !entry.invalidated {
                    entry.invalidated = true;
                    to_persist.push((key.clone(), entry.clone()));
                }
            }
            let to_refetch: Vec<(String, Fetcher, Duration)> = state
                .watchers
                .iter()
                .filter(|(key, _)| pattern.matches(key))
                .map(|(key, w)| (key.clone(), Arc::clone(&w.fetcher), w.ttl))
                .collect();
            (to_refetch, to_persist)
        };
        tracing::debug!(pattern = %pattern, marked = to_persist.len(), "invalidated");

        if self.is_online() {
            for (key, fetcher, ttl) in to_refetch {
                self.revalidate(&key, fetcher, ttl);
            }
        }
        if self.inner.config.persist && !to_persist.is_empty() {
            let inner = Arc::clone(&self.inner);
            self.inner.ctx.scheduler.spawn(Box::pin(async move {
                for (key, entry) in to_persist {
                    inner.persist_entry(&key, &entry).await;
                }
            }));
        }
    }

    /// Applies `updater` to the current value ahead of server confirmation.
    ///
    /// Any in-flight fetch for the key is superseded. Only one patch may be
    /// outstanding per key; a second one fails with [`Error::PatchInFlight`].
    pub fn apply_optimistic<F>(&self, key: &QueryKey, updater: F) -> Result<PatchHandle>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let rendered = key.to_string();
        let now = self.now_ms();
        let ttl_ms = self.inner.config.ttl.ttl_for(key).as_millis() as u64;
        let mut state = self.inner.state();
        if state.patches.contains_key(&rendered) {
            return Err(Error::PatchInFlight(rendered));
        }

        let previous = state.entries.get(&rendered).cloned();
        let data = updater(previous.as_ref().map(|e| &e.data));
        state.bump(&rendered);
        state.entries.insert(
            rendered.clone(),
            CacheEntry { data, fetched_at_ms: now, ttl_ms, invalidated: false },
        );

        let id = self.inner.next_patch.fetch_add(1, Ordering::Relaxed);
        state.patches.insert(rendered, Patch { id, previous });
        Ok(PatchHandle { key: key.clone(), id })
    }

    /// Settles a patch. On success the optimistic value stays; on failure
    /// the snapshot taken before the patch is restored exactly and the error
    /// is returned.
    pub async fn commit_or_rollback(
        &self,
        handle: PatchHandle,
        outcome: std::result::Result<(), Error>,
    ) -> Result<()> {
        let rendered = handle.key.to_string();
        self.settle(handle, outcome.is_ok()).await?;
        outcome.inspect_err(|err| {
            tracing::debug!(key = %rendered, error = %err, "rolled back optimistic update");
        })
    }

    /// Restores the snapshot taken before the patch.
    pub async fn rollback(&self, handle: PatchHandle) -> Result<()> {
        self.settle(handle, false).await
    }

    async fn settle(&self, handle: PatchHandle, commit: bool) -> Result<()> {
        let rendered = handle.key.to_string();
        let settled = {
            let mut state = self.inner.state();
            let patch = match state.patches.remove(&rendered) {
                Some(patch) if patch.id == handle.id => patch,
                Some(other) => {
                    state.patches.insert(rendered.clone(), other);
                    return Err(Error::UnknownPatch(rendered));
                }
                None => return Err(Error::UnknownPatch(rendered)),
            };
            if commit {
                state.entries.get(&rendered).cloned()
            } else {
                state.bump(&rendered);
                match &patch.previous {
                    Some(entry) => state.entries.insert(rendered.clone(), entry.clone()),
                    None => state.entries.remove(&rendered),
                };
                patch.previous
            }
        };

        match &settled {
            Some(entry) => self.inner.persist_entry(&rendered, entry).await,
            None => self.inner.unpersist(&rendered).await,
        }
        Ok(())
    }

    pub fn has_pending_patch(&self, key: &QueryKey) -> bool {
        self.inner.state().patches.contains_key(&key.to_string())
    }

    /// Stores a value directly as fresh server data.
    pub async fn put(&self, key: &QueryKey, data: Value) {
        if let Some((rendered, entry)) = self.put_entry(key, data) {
            self.inner.persist_entry(&rendered, &entry).await;
        }
    }

    fn put_entry(&self, key: &QueryKey, data: Value) -> Option<(String, CacheEntry)> {
        let rendered = key.to_string();
        let entry = CacheEntry {
            data,
            fetched_at_ms: self.now_ms(),
            ttl_ms: self.inner.config.ttl.ttl_for(key).as_millis() as u64,
            invalidated: false,
        };
        let mut state = self.inner.state();
        if let Some(patch) = state.patches.get_mut(&rendered) {
            // The optimistic value stays visible; a rollback lands on server data.
            patch.previous = Some(entry);
            return None;
        }
        state.bump(&rendered);
        state.entries.insert(rendered.clone(), entry.clone());
        Some((rendered, entry))
    }

    /// Current in-memory value, fresh or not.
    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        self.inner.state().entries.get(&key.to_string()).map(|e| e.data.clone())
    }

    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner.state().entries.get(&key.to_string()).cloned()
    }

    pub async fn remove(&self, key: &QueryKey) {
        let rendered = key.to_string();
        {
            let mut state = self.inner.state();
            state.entries.remove(&rendered);
            state.bump(&rendered);
        }
        self.inner.unpersist(&rendered).await;
    }

    /// Drops every entry, in memory and persisted. Outstanding patches are
    /// discarded with them.
    pub async fn clear(&self) -> Result<()> {
        {
            let mut state = self.inner.state();
            let keys: Vec<String> = state.entries.keys().cloned().collect();
            for key in keys {
                state.bump(&key);
            }
            state.entries.clear();
            state.patches.clear();
        }
        if self.inner.config.persist {
            let keys = self.inner.ctx.store.keys(CACHE_PREFIX).await?;
            self.inner.ctx.store.remove_many(&keys).await?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies a connectivity edge. Offline to online refetches every
    /// watched key that is stale or missing.
    pub fn set_online(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::AcqRel);
        if was_online == online || !online {
            return;
        }
        let now = self.now_ms();
        let stale: Vec<(String, Fetcher, Duration)> = {
            let state = self.inner.state();
            state
                .watchers
                .iter()
                .filter(|(key, _)| state.entries.get(*key).map_or(true, |e| e.is_stale(now)))
                .map(|(key, w)| (key.clone(), Arc::clone(&w.fetcher), w.ttl))
                .collect()
        };
        tracing::info!(count = stale.len(), "online, revalidating stale watched keys");
        for (key, fetcher, ttl) in stale {
            self.revalidate(&key, fetcher, ttl);
        }
    }
}

impl CacheSink for SyncCache {
    fn invalidate(&self, pattern: &KeyPattern) {
        SyncCache::invalidate(self, pattern);
    }

    fn apply_update(&self, key: &QueryKey, data: Value) {
        if let Some((rendered, entry)) = self.put_entry(key, data) {
            if self.inner.config.persist {
                let inner = Arc::clone(&self.inner);
                self.inner.ctx.scheduler.spawn(Box::pin(async move {
                    inner.persist_entry(&rendered, &entry).await;
                }));
            }
        }
    }
}

/// Keeps a key watched until dropped.
#[must_use = "the key is unwatched as soon as the guard is dropped"]
pub struct WatchGuard {
    cache: Weak<CacheInner>,
    key: String,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        let Some(inner) = self.cache.upgrade() else {
            return;
        };
        let mut state = inner.state();
        if let Some(watcher) = state.watchers.get_mut(&self.key) {
            watcher.views -= 1;
            if watcher.views == 0 {
                state.watchers.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
