// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use crate::store::DurableStore;
use crate::test_helpers::{settle, FlakyStore, Harness, Outcome, RecordingSink};
use offsync_core::{Method, Priority};
use serde_json::Value;

/// Settle hook that keeps every id with its outcome rendered.
#[derive(Default)]
struct RecordingHook {
    settled: Mutex<Vec<(RequestId, std::result::Result<(), String>)>>,
}

impl RecordingHook {
    fn install(queue: &RequestQueue) -> Arc<Self> {
        let hook = Arc::new(RecordingHook::default());
        queue.set_settle_hook(hook.clone());
        hook
    }

    fn outcomes(&self) -> Vec<(RequestId, std::result::Result<(), String>)> {
        self.settled.lock().unwrap().clone()
    }
}

impl SettleHook for RecordingHook {
    fn settled<'a>(&'a self, id: &'a RequestId, outcome: Result<()>) -> SettleFuture<'a> {
        self.settled.lock().unwrap().push((id.clone(), outcome.map_err(|e| e.to_string())));
        Box::pin(async {})
    }
}

fn config() -> QueueConfig {
    QueueConfig::default()
}

async fn open(harness: &Harness, config: QueueConfig) -> RequestQueue {
    RequestQueue::open(config, harness.ctx.clone()).await.unwrap()
}

fn post(name: &str, priority: Priority) -> NewRequest {
    NewRequest::new(Method::Post, format!("/items/{name}")).priority(priority)
}

#[tokio::test(start_paused = true)]
async fn test_replays_priority_then_fifo() {
    let harness = Harness::new();
    let queue = open(&harness, config()).await;

    queue.enqueue(post("a", Priority::Low)).await.unwrap();
    harness.clock.advance(Duration::from_millis(1));
    queue.enqueue(post("b", Priority::High)).await.unwrap();
    harness.clock.advance(Duration::from_millis(1));
    queue.enqueue(post("c", Priority::Normal)).await.unwrap();
    assert_eq!(harness.executor.call_count(), 0);

    queue.set_online(true);
    settle().await;

    assert_eq!(harness.executor.targets(), ["/items/b", "/items/c", "/items/a"]);
    assert_eq!(queue.status().await.total, 0);
}

#[tokio::test(start_paused = true)]
async fn test_offline_enqueue_notifies_deferral() {
    let harness = Harness::new();
    let queue = open(&harness, config()).await;

    queue
        .enqueue(NewRequest::new(Method::Post, "/campaigns").description("Create campaign"))
        .await
        .unwrap();

    assert_eq!(harness.notifier.of_kind(NotifyKind::Info), ["Create campaign queued for sync"]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_allows_four_attempts() {
    let harness = Harness::new();
    harness.executor.set_fallback(Outcome::Status(503));
    let queue = open(&harness, config()).await;
    let id = queue.enqueue(post("a", Priority::Normal).max_retries(3)).await.unwrap();

    queue.inner.online.store(true, Ordering::SeqCst);
    let summary = queue.drain().await;

    assert_eq!(harness.executor.call_count(), 4);
    assert_eq!(summary, PassSummary { succeeded: 0, retried: 3, exhausted: 1, rejected: 0 });

    let failed = queue.failed_requests().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, id);
    assert!(failed[0].last_error.as_deref().unwrap().contains("503"));

    let errors = harness.notifier.of_kind(NotifyKind::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Retry manually"));

    // Over budget: never attempted a fifth time.
    queue.process_queue().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.executor.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_client_rejection_drops_after_one_attempt() {
    let harness = Harness::new();
    harness.executor.push(Outcome::Status(422));
    let queue = open(&harness, config()).await;
    queue
        .enqueue(post("a", Priority::Normal).error_message("Could not save item"))
        .await
        .unwrap();

    queue.inner.online.store(true, Ordering::SeqCst);
    let summary = queue.drain().await;

    assert_eq!(summary.rejected, 1);
    assert_eq!(harness.executor.call_count(), 1);
    assert!(queue.requests().await.is_empty());
    assert_eq!(harness.notifier.of_kind(NotifyKind::Error), ["Could not save item"]);
}

#[tokio::test(start_paused = true)]
async fn test_overflow_keeps_most_recent_low_priority() {
    let harness = Harness::new();
    let queue = open(&harness, QueueConfig { max_queue_size: 2, ..config() }).await;

    for name in ["a", "b", "c"] {
        queue.enqueue(post(name, Priority::Low)).await.unwrap();
        harness.clock.advance(Duration::from_millis(10));
    }

    let targets: Vec<String> = queue.requests().await.into_iter().map(|r| r.target).collect();
    assert_eq!(targets, ["/items/b", "/items/c"]);

    queue.set_online(true);
    settle().await;
    assert_eq!(harness.executor.targets(), ["/items/b", "/items/c"]);
}

#[tokio::test(start_paused = true)]
async fn test_queue_survives_reopen() {
    let first = Harness::new();
    let queue = open(&first, config()).await;
    let id = queue.enqueue(post("a", Priority::High)).await.unwrap();
    queue.enqueue(post("b", Priority::Low)).await.unwrap();

    let stored = first.store.get(QUEUE_KEY).await.unwrap().unwrap();
    assert!(stored.contains(id.as_str()));

    let second = Harness::with_store(first.store.clone());
    let reopened = open(&second, config()).await;
    let requests = reopened.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].id, id);
}

#[tokio::test(start_paused = true)]
async fn test_batch_size_limits_a_pass() {
    let harness = Harness::new();
    let queue = open(&harness, QueueConfig { batch_size: 2, ..config() }).await;
    for name in ["a", "b", "c"] {
        queue.enqueue(post(name, Priority::Normal)).await.unwrap();
    }

    queue.inner.online.store(true, Ordering::SeqCst);
    let summary = queue.run_pass().await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(queue.requests().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failure_replays_after_fixed_delay() {
    let harness = Harness::new();
    harness.executor.push(Outcome::Network);
    let queue = open(&harness, config()).await;
    queue.set_online(true);
    settle().await;

    queue.enqueue(post("a", Priority::Normal)).await.unwrap();
    settle().await;
    assert_eq!(harness.executor.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(harness.executor.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.executor.call_count(), 2);
    assert!(queue.requests().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_going_offline_cancels_retry_timer() {
    let harness = Harness::new();
    harness.executor.set_fallback(Outcome::Status(500));
    let queue = open(&harness, config()).await;
    queue.set_online(true);
    queue.enqueue(post("a", Priority::Normal)).await.unwrap();
    settle().await;
    assert_eq!(harness.executor.call_count(), 1);

    queue.set_online(false);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(harness.executor.call_count(), 1);
    assert_eq!(queue.status().await.pending, 1);
}

#[tokio::test(start_paused = true)]
async fn test_passes_never_overlap() {
    let harness = Harness::new();
    harness.executor.set_delay(Duration::from_secs(1));
    let queue = open(&harness, config()).await;
    queue.enqueue(post("a", Priority::Normal)).await.unwrap();
    queue.inner.online.store(true, Ordering::SeqCst);

    let (first, second) = tokio::join!(queue.run_pass(), queue.run_pass());

    assert_eq!(first.succeeded + second.succeeded, 1);
    assert_eq!(harness.executor.call_count(), 1);
    assert!(!queue.is_processing());
}

#[tokio::test(start_paused = true)]
async fn test_retry_failed_resets_budget_and_replays() {
    let harness = Harness::new();
    harness.executor.set_fallback(Outcome::Network);
    let queue = open(&harness, config()).await;
    queue.enqueue(post("a", Priority::Normal).max_retries(0)).await.unwrap();
    queue.inner.online.store(true, Ordering::SeqCst);
    queue.drain().await;
    assert_eq!(queue.status().await.failed, 1);

    harness.executor.set_fallback(Outcome::Ok(Value::Null));
    assert_eq!(queue.retry_failed_requests().await.unwrap(), 1);
    settle().await;

    assert_eq!(harness.executor.call_count(), 2);
    assert!(queue.requests().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_settled_requests_invalidate_cache_patterns() {
    let harness = Harness::new();
    let sink = RecordingSink::new();
    let queue = open(&harness, config()).await;
    queue.set_sink(sink.clone());
    queue
        .enqueue(
            post("a", Priority::Normal)
                .invalidates("campaigns*")
                .invalidates("dashboard*")
                .success_message("Campaign saved"),
        )
        .await
        .unwrap();

    queue.inner.online.store(true, Ordering::SeqCst);
    queue.drain().await;

    assert_eq!(sink.invalidated(), ["campaigns*", "dashboard*"]);
    assert_eq!(harness.notifier.of_kind(NotifyKind::Success), ["Campaign saved"]);
}

#[tokio::test(start_paused = true)]
async fn test_remove_and_clear() {
    let harness = Harness::new();
    let queue = open(&harness, config()).await;
    let a = queue.enqueue(post("a", Priority::Normal)).await.unwrap();
    queue.enqueue(post("b", Priority::Normal)).await.unwrap();
    queue.enqueue(post("c", Priority::Normal)).await.unwrap();

    assert!(queue.remove_from_queue(&a).await.unwrap());
    assert!(!queue.remove_from_queue(&a).await.unwrap());
    assert_eq!(queue.status().await.total, 2);

    assert_eq!(queue.clear_queue().await.unwrap(), 2);
    assert_eq!(harness.store.get(QUEUE_KEY).await.unwrap().as_deref(), Some("[]"));
}

#[tokio::test(start_paused = true)]
async fn test_status_is_read_only() {
    let harness = Harness::new();
    let queue = open(&harness, config()).await;
    queue.enqueue(post("a", Priority::Normal)).await.unwrap();

    let status = queue.status().await;

    assert_eq!(status, QueueStatus { total: 1, pending: 1, failed: 0, is_processing: false, is_online: false });
    assert_eq!(harness.executor.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_replay_now_drains_and_stays_offline() {
    let harness = Harness::new();
    harness.executor.push(Outcome::Network);
    let queue = open(&harness, config()).await;
    queue.enqueue(post("a", Priority::Normal)).await.unwrap();
    queue.enqueue(post("b", Priority::Normal)).await.unwrap();

    let summary = queue.replay_now().await;

    assert_eq!(summary, PassSummary { succeeded: 2, retried: 1, exhausted: 0, rejected: 0 });
    assert_eq!(harness.executor.call_count(), 3);
    assert!(!queue.is_online());
    assert!(queue.requests().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_settle_hook_hears_each_way_out() {
    let harness = Harness::new();
    harness.executor.push(Outcome::Ok(Value::Null));
    harness.executor.push(Outcome::Status(422));
    harness.executor.push(Outcome::Status(503));
    let queue = open(&harness, config()).await;
    let hook = RecordingHook::install(&queue);
    let a = queue.enqueue(post("a", Priority::High)).await.unwrap();
    let b = queue.enqueue(post("b", Priority::Normal)).await.unwrap();
    let c = queue.enqueue(post("c", Priority::Low).max_retries(0)).await.unwrap();

    queue.set_online(true);
    settle().await;
    queue.set_online(false);

    let outcomes = hook.outcomes();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0], (a, Ok(())));
    assert!(matches!(&outcomes[1], (id, Err(e)) if *id == b && e.contains("422")));
    assert!(matches!(&outcomes[2], (id, Err(e)) if *id == c && e.contains("503")));

    // Removing pending requests reports them; the failed one was already reported.
    let d = queue.enqueue(post("d", Priority::Normal)).await.unwrap();
    assert!(queue.remove_from_queue(&d).await.unwrap());
    let e = queue.enqueue(post("e", Priority::Normal)).await.unwrap();
    assert_eq!(queue.clear_queue().await.unwrap(), 2);

    let outcomes = hook.outcomes();
    assert_eq!(outcomes.len(), 5);
    assert!(matches!(&outcomes[3], (id, Err(msg)) if *id == d && msg.contains("dropped")));
    assert!(matches!(&outcomes[4], (id, Err(msg)) if *id == e && msg.contains("dropped")));
}

#[tokio::test(start_paused = true)]
async fn test_settle_hook_hears_evictions() {
    let harness = Harness::new();
    let queue = open(&harness, QueueConfig { max_queue_size: 1, ..config() }).await;
    let hook = RecordingHook::install(&queue);
    let low = queue.enqueue(post("low", Priority::Low)).await.unwrap();
    queue.enqueue(post("high", Priority::High)).await.unwrap();
    settle().await;

    let outcomes = hook.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(&outcomes[0], (id, Err(msg)) if *id == low && msg.contains("queue overflow")));
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_leaves_queue_unchanged() {
    let harness = Harness::new();
    let store = FlakyStore::new();
    let queue = RequestQueue::open(config(), harness.ctx_with_store(store.clone())).await.unwrap();
    queue.enqueue(post("a", Priority::Normal)).await.unwrap();

    store.fail_writes(true);
    let err = queue.enqueue(post("b", Priority::Normal)).await.unwrap_err();

    assert!(matches!(err, Error::Store(_)));
    let targets: Vec<String> = queue.requests().await.into_iter().map(|r| r.target).collect();
    assert_eq!(targets, ["/items/a"]);
}
