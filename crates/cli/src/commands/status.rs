// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::DateTime;
use offsync_core::{QueueStatus, QueuedRequest};
use serde::Serialize;

use super::Session;
use crate::error::Result;
use crate::queue::RequestQueue;

#[derive(Serialize)]
struct StatusReport<'a> {
    #[serde(flatten)]
    status: QueueStatus,
    requests: &'a [QueuedRequest],
}

pub async fn run(session: &Session, json: bool) -> Result<()> {
    let queue = session.open_queue(session.offline_context()?).await?;
    print!("{}", render(&queue, json).await?);
    Ok(())
}

pub(crate) async fn render(queue: &RequestQueue, json: bool) -> Result<String> {
    let status = queue.status().await;
    let requests = queue.requests().await;
    if json {
        let mut out = serde_json::to_string_pretty(&StatusReport { status, requests: &requests })?;
        out.push('\n');
        return Ok(out);
    }

    let mut out = format!(
        "{} queued ({} pending, {} failed)\n",
        status.total, status.pending, status.failed
    );
    for request in &requests {
        out.push_str(&format_request(request));
        out.push('\n');
    }
    Ok(out)
}

fn format_timestamp(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// One line per request: id, priority, call, attempts, enqueue time, state.
pub(crate) fn format_request(request: &QueuedRequest) -> String {
    let mut line = format!(
        "{}  {:<6}  {} {}  retries {}/{}  {}",
        request.id,
        request.priority.to_string(),
        request.method,
        request.target,
        request.retry_count,
        request.max_retries,
        format_timestamp(request.enqueued_at_ms),
    );
    if let Some(description) = &request.metadata.description {
        line.push_str(&format!("  \"{description}\""));
    }
    if request.is_failed() {
        line.push_str("  FAILED");
    }
    if let Some(error) = &request.last_error {
        line.push_str(&format!(": {error}"));
    }
    line
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
