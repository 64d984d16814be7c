// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::Session;
use crate::error::Result;
use crate::queue::PassSummary;

pub async fn run(session: &Session) -> Result<()> {
    let queue = session.open_queue(session.http_context()?).await?;
    let summary = queue.replay_now().await;
    let status = queue.status().await;
    println!("{}", format_summary(&summary, status.total, status.failed));
    Ok(())
}

pub(crate) fn format_summary(summary: &PassSummary, remaining: usize, failed: usize) -> String {
    let mut out = format!(
        "Replayed {}: {} succeeded, {} rejected",
        summary.attempted(),
        summary.succeeded,
        summary.rejected
    );
    if summary.exhausted > 0 {
        out.push_str(&format!(", {} out of retries", summary.exhausted));
    }
    if remaining > 0 {
        out.push_str(&format!("\n{remaining} still queued ({failed} failed)"));
    }
    out
}

#[cfg(test)]
#[path = "replay_tests.rs"]
mod tests;
