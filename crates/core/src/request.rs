// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Deferred mutation requests and their replay order.
//!
//! A [`QueuedRequest`] is the durable unit of work held by the Request Queue.
//! Replay order is priority tier first (high before normal before low), then
//! FIFO by enqueue time within a tier, so a create-then-update pair on the
//! same resource always replays in the order it was issued.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Transport-level verb for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" | "CREATE" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" | "UPDATE" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(format!("invalid method '{s}': expected GET, POST, PUT, PATCH or DELETE")),
        }
    }
}

/// Replay priority tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Numeric rank; higher replays first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Normal => 2,
            Priority::Low => 1,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        })
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(format!("invalid priority '{s}': expected high, normal or low")),
        }
    }
}

/// Unique identifier assigned at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Derives an id from the request's identity and a per-queue sequence number.
    /// Format: `req-{hash}` where hash is the first 8 hex chars of SHA-256.
    pub fn generate(method: Method, target: &str, enqueued_at_ms: u64, seq: u64) -> Self {
        let input = format!("{method}{target}{enqueued_at_ms}:{seq}");
        let hash = Sha256::digest(input.as_bytes());
        RequestId(format!("req-{}", hex::encode(&hash[..4])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-facing description and cache hints attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Cache key patterns to invalidate once the request settles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalidates: Vec<String>,
}

/// A request as handed to the queue, before an id and timestamp are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRequest {
    pub method: Method,
    pub target: String,
    pub payload: Option<serde_json::Value>,
    pub priority: Priority,
    pub max_retries: Option<u32>,
    pub metadata: RequestMetadata,
}

impl NewRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        NewRequest {
            method,
            target: target.into(),
            payload: None,
            priority: Priority::default(),
            max_retries: None,
            metadata: RequestMetadata::default(),
        }
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.metadata.success_message = Some(message.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.metadata.error_message = Some(message.into());
        self
    }

    /// Adds a cache key pattern to invalidate when the request settles.
    pub fn invalidates(mut self, pattern: impl Into<String>) -> Self {
        self.metadata.invalidates.push(pattern.into());
        self
    }
}

/// One durable unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: RequestId,
    pub method: Method,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub priority: Priority,
    pub enqueued_at_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub metadata: RequestMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedRequest {
    /// Assigns identity and bookkeeping to a new request.
    pub fn from_new(
        request: NewRequest,
        enqueued_at_ms: u64,
        seq: u64,
        default_max_retries: u32,
    ) -> Self {
        QueuedRequest {
            id: RequestId::generate(request.method, &request.target, enqueued_at_ms, seq),
            method: request.method,
            target: request.target,
            payload: request.payload,
            priority: request.priority,
            enqueued_at_ms,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(default_max_retries),
            metadata: request.metadata,
            last_error: None,
        }
    }

    /// Still within its retry budget and part of the active replay set.
    pub fn is_eligible(&self) -> bool {
        self.retry_count <= self.max_retries
    }

    /// Over budget; kept only for diagnostics and manual retry.
    pub fn is_failed(&self) -> bool {
        !self.is_eligible()
    }

    /// Total attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.retry_count
    }
}

/// Replay ordering: priority rank descending, then enqueue time ascending.
pub fn replay_order(a: &QueuedRequest, b: &QueuedRequest) -> Ordering {
    b.priority.rank().cmp(&a.priority.rank()).then_with(|| a.enqueued_at_ms.cmp(&b.enqueued_at_ms))
}

/// Sorts requests into replay order. Stable, so equal keys keep insertion order.
pub fn sort_for_replay(requests: &mut [QueuedRequest]) {
    requests.sort_by(replay_order);
}

/// Evicts requests until at most `max` remain, returning the evicted ones.
///
/// Victims are chosen failed entries first, then lowest priority, then
/// oldest within that priority. The survivors keep replay order.
pub fn truncate_to(requests: &mut Vec<QueuedRequest>, max: usize) -> Vec<QueuedRequest> {
    let mut evicted = Vec::new();
    while requests.len() > max {
        let victim = requests
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.is_eligible()
                    .cmp(&b.is_eligible())
                    .then_with(|| a.priority.rank().cmp(&b.priority.rank()))
                    .then_with(|| a.enqueued_at_ms.cmp(&b.enqueued_at_ms))
            })
            .map(|(index, _)| index);
        match victim {
            Some(index) => evicted.push(requests.remove(index)),
            None => break,
        }
    }
    evicted
}

/// Read-only queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total: usize,
    pub pending: usize,
    pub failed: usize,
    pub is_processing: bool,
    pub is_online: bool,
}

impl QueueStatus {
    pub fn from_requests(requests: &[QueuedRequest], is_processing: bool, is_online: bool) -> Self {
        let failed = requests.iter().filter(|r| r.is_failed()).count();
        QueueStatus {
            total: requests.len(),
            pending: requests.len() - failed,
            failed,
            is_processing,
            is_online,
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
