// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use offsync_core::{NewRequest, RequestId};

use super::Session;
use crate::cli::EnqueueArgs;
use crate::error::{Error, Result};
use crate::queue::RequestQueue;

pub async fn run(session: &Session, args: EnqueueArgs) -> Result<()> {
    let queue = session.open_queue(session.offline_context()?).await?;
    let id = run_impl(&queue, args).await?;
    println!("{id}");
    Ok(())
}

pub(crate) async fn run_impl(queue: &RequestQueue, args: EnqueueArgs) -> Result<RequestId> {
    Ok(queue.enqueue(build_request(args)?).await?)
}

pub(crate) fn build_request(args: EnqueueArgs) -> Result<NewRequest> {
    let mut request = NewRequest::new(args.method, args.target).priority(args.priority);
    if let Some(payload) = args.payload {
        let value = serde_json::from_str(&payload)
            .map_err(|e| Error::InvalidPayload(e.to_string()))?;
        request = request.payload(value);
    }
    if let Some(max_retries) = args.max_retries {
        request = request.max_retries(max_retries);
    }
    if let Some(description) = args.description {
        request = request.description(description);
    }
    Ok(request)
}

#[cfg(test)]
#[path = "enqueue_tests.rs"]
mod tests;
