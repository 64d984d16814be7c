// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Queue maintenance: retry-failed, remove, clear.

use offsync_core::RequestId;

use super::Session;
use crate::error::{Error, Result};

pub async fn retry_failed(session: &Session) -> Result<()> {
    let queue = session.open_queue(session.offline_context()?).await?;
    let reset = queue.retry_failed_requests().await?;
    println!("Reset {reset} failed request(s)");
    Ok(())
}

pub async fn remove(session: &Session, id: &str) -> Result<()> {
    let queue = session.open_queue(session.offline_context()?).await?;
    if !queue.remove_from_queue(&RequestId::from(id)).await? {
        return Err(Error::RequestNotFound(id.to_string()));
    }
    println!("Removed {id}");
    Ok(())
}

pub async fn clear(session: &Session) -> Result<()> {
    let queue = session.open_queue(session.offline_context()?).await?;
    let removed = queue.clear_queue().await?;
    println!("Cleared {removed} request(s)");
    Ok(())
}
