// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

fn queued(name: &str, priority: Priority, enqueued_at_ms: u64) -> QueuedRequest {
    QueuedRequest::from_new(
        NewRequest::new(Method::Post, format!("/items/{name}")).priority(priority),
        enqueued_at_ms,
        0,
        3,
    )
}

fn targets(requests: &[QueuedRequest]) -> Vec<&str> {
    requests.iter().map(|r| r.target.as_str()).collect()
}

#[test]
fn replay_order_is_priority_then_fifo() {
    let mut requests = vec![
        queued("a", Priority::Low, 0),
        queued("b", Priority::High, 1),
        queued("c", Priority::Normal, 2),
    ];
    sort_for_replay(&mut requests);
    assert_eq!(targets(&requests), ["/items/b", "/items/c", "/items/a"]);
}

#[test]
fn replay_order_keeps_fifo_within_tier() {
    let mut requests = vec![
        queued("update", Priority::Normal, 20),
        queued("create", Priority::Normal, 10),
        queued("urgent", Priority::High, 30),
        queued("delete", Priority::Normal, 30),
    ];
    sort_for_replay(&mut requests);
    assert_eq!(
        targets(&requests),
        ["/items/urgent", "/items/create", "/items/update", "/items/delete"]
    );
}

#[test]
fn truncate_keeps_most_recent_low_priority() {
    let mut requests =
        vec![queued("a", Priority::Low, 0), queued("b", Priority::Low, 1), queued("c", Priority::Low, 2)];
    sort_for_replay(&mut requests);

    let evicted = truncate_to(&mut requests, 2);

    assert_eq!(targets(&evicted), ["/items/a"]);
    assert_eq!(targets(&requests), ["/items/b", "/items/c"]);
}

#[test]
fn truncate_evicts_lowest_priority_before_older_high() {
    let mut requests = vec![
        queued("old-high", Priority::High, 0),
        queued("new-low", Priority::Low, 50),
        queued("normal", Priority::Normal, 10),
    ];
    sort_for_replay(&mut requests);

    let evicted = truncate_to(&mut requests, 2);

    assert_eq!(targets(&evicted), ["/items/new-low"]);
    assert_eq!(targets(&requests), ["/items/old-high", "/items/normal"]);
}

#[test]
fn truncate_evicts_failed_entries_first() {
    let mut failed = queued("failed-high", Priority::High, 0);
    failed.retry_count = failed.max_retries + 1;
    let mut requests = vec![failed, queued("low", Priority::Low, 5)];

    let evicted = truncate_to(&mut requests, 1);

    assert_eq!(targets(&evicted), ["/items/failed-high"]);
    assert_eq!(targets(&requests), ["/items/low"]);
}

#[test]
fn truncate_within_bound_is_noop() {
    let mut requests = vec![queued("a", Priority::Low, 0)];
    assert!(truncate_to(&mut requests, 5).is_empty());
    assert_eq!(requests.len(), 1);
}

#[test]
fn eligibility_tracks_retry_budget() {
    let mut request = queued("a", Priority::Normal, 0);
    assert_eq!(request.max_retries, 3);
    for _ in 0..3 {
        request.retry_count += 1;
        assert!(request.is_eligible());
    }
    request.retry_count += 1;
    assert!(request.is_failed());
}

#[test]
fn explicit_max_retries_overrides_default() {
    let request = QueuedRequest::from_new(NewRequest::new(Method::Delete, "/x").max_retries(7), 0, 0, 3);
    assert_eq!(request.max_retries, 7);
}

#[test]
fn ids_differ_by_sequence() {
    let a = RequestId::generate(Method::Post, "/items", 1000, 0);
    let b = RequestId::generate(Method::Post, "/items", 1000, 1);
    assert_ne!(a, b);
    assert!(a.as_str().starts_with("req-"));
    assert_eq!(a.as_str().len(), "req-".len() + 8);
}

#[test]
fn queue_status_counts_failed() {
    let mut failed = queued("a", Priority::Normal, 0);
    failed.retry_count = 4;
    let requests = vec![failed, queued("b", Priority::Normal, 1), queued("c", Priority::Low, 2)];

    let status = QueueStatus::from_requests(&requests, true, false);

    assert_eq!(status.total, 3);
    assert_eq!(status.pending, 2);
    assert_eq!(status.failed, 1);
    assert!(status.is_processing);
    assert!(!status.is_online);
}

#[parameterized(
    get = { "get", Method::Get },
    post = { "POST", Method::Post },
    create = { "create", Method::Post },
    update = { "update", Method::Patch },
    delete = { "Delete", Method::Delete },
)]
fn method_parse(input: &str, expected: Method) {
    assert_eq!(input.parse::<Method>().unwrap(), expected);
}

#[test]
fn method_parse_rejects_unknown() {
    assert!("TRACE".parse::<Method>().is_err());
}

#[test]
fn builder_collects_metadata() {
    let request = NewRequest::new(Method::Post, "/campaigns")
        .payload(serde_json::json!({"name": "spring"}))
        .priority(Priority::High)
        .description("Create campaign")
        .success_message("Campaign created")
        .error_message("Could not create campaign")
        .invalidates("campaigns*");

    assert_eq!(request.priority, Priority::High);
    assert_eq!(request.metadata.description.as_deref(), Some("Create campaign"));
    assert_eq!(request.metadata.invalidates, ["campaigns*"]);
}

#[test]
fn queued_request_json_shape() {
    let request = queued("a", Priority::High, 7);
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["method"], "POST");
    assert_eq!(json["priority"], "high");
    assert_eq!(json["enqueued_at_ms"], 7);
    assert!(json.get("payload").is_none());
}
