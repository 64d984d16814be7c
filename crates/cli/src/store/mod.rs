// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key/value persistence for the queue and cache.
//!
//! Both collaborators share one store under distinct namespaces:
//! - `offsync:queue` holds the whole queue as a JSON array
//! - `offsync:cache:<key>` holds one persisted cache entry per query key
//!
//! Values are opaque strings (JSON in practice).

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::future::Future;
use std::pin::Pin;

use offsync_core::Result;

/// Key holding the persisted Request Queue.
pub const QUEUE_KEY: &str = "offsync:queue";

/// Prefix for persisted cache entries.
pub const CACHE_PREFIX: &str = "offsync:cache:";

/// Store key for a rendered cache key.
pub fn cache_key(key: &str) -> String {
    format!("{CACHE_PREFIX}{key}")
}

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Read/write contract the queue and cache persist through.
pub trait DurableStore: Send + Sync {
    /// Returns the value for `key`, or `None` if absent.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    fn remove_many<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, ()>;

    /// Lists stored keys starting with `prefix`.
    fn keys<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;
}
