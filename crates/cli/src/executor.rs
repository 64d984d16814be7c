// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Request execution against the server.
//!
//! Both queued replays and direct mutations go through an [`Executor`].
//! Failures come back classified so the queue can decide whether to retry:
//! - non-success status: [`Error::from_status`] (4xx rejected, 5xx retryable)
//! - timeout: [`Error::Timeout`]
//! - connect/request failures: [`Error::TransientNetwork`]

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use offsync_core::{Error, Method, QueuedRequest, Result};
use serde_json::Value;

/// Header carrying the queued request id so replays are idempotent server-side.
pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Boxed future returned by [`Executor::execute`].
pub type ExecuteFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// One outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub method: Method,
    pub target: String,
    pub payload: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl ExecuteRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        ExecuteRequest { method, target: target.into(), payload: None, headers: Vec::new() }
    }

    pub fn payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Builds the replay call for a queued request.
    pub fn from_queued(request: &QueuedRequest) -> Self {
        ExecuteRequest::new(request.method, request.target.clone())
            .payload(request.payload.clone())
            .header(IDEMPOTENCY_KEY, request.id.as_str())
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Performs calls against the server.
pub trait Executor: Send + Sync {
    fn execute(&self, request: ExecuteRequest) -> ExecuteFuture<'_>;
}

/// HTTP executor over `reqwest`.
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpExecutor {
    /// Creates an executor for `base_url`. `timeout` applies to every call,
    /// queued replays included.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        token: Option<String>,
    ) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::error::Error::HttpClient(e.to_string()))?;

        Ok(HttpExecutor { client, base_url: base_url.trim_end_matches('/').to_string(), token })
    }

    /// Resolves a target against the base URL. Absolute URLs pass through.
    pub fn url_for(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!("{}/{}", self.base_url, target.trim_start_matches('/'))
        }
    }

    async fn send(&self, request: ExecuteRequest) -> Result<Value> {
        let url = self.url_for(&request.target);
        let mut builder = self.client.request(to_reqwest(request.method), &url);

        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = &request.payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(|e| classify(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| classify(&e))?;
        tracing::debug!(method = %request.method, url = %url, status = status.as_u16(), "executed");

        if !status.is_success() {
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            };
            return Err(Error::from_status(status.as_u16(), message));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

impl Executor for HttpExecutor {
    fn execute(&self, request: ExecuteRequest) -> ExecuteFuture<'_> {
        Box::pin(self.send(request))
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Maps a transport failure onto the retry taxonomy.
fn classify(err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        return Error::Timeout;
    }
    if let Some(status) = err.status() {
        return Error::from_status(status.as_u16(), err.to_string());
    }
    Error::TransientNetwork(err.to_string())
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
