// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use offsync_core::{NewRequest, Priority};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use yare::parameterized;

fn header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0)
}

/// Serves one canned response and hands back the raw request text.
async fn serve_once(status: u16, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
            if let Some(end) = header_end(&buffer) {
                let head = String::from_utf8_lossy(&buffer[..end]).to_string();
                if buffer.len() >= end + content_length(&head) {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {status} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(String::from_utf8_lossy(&buffer).to_string());
    });

    (format!("http://{addr}"), rx)
}

fn executor(base_url: &str) -> HttpExecutor {
    HttpExecutor::new(base_url, Duration::from_secs(5), Some("secret".into())).unwrap()
}

#[tokio::test]
async fn test_success_returns_json_body() {
    let (url, _rx) = serve_once(200, r#"{"id":"c-1"}"#).await;
    let value = executor(&url)
        .execute(ExecuteRequest::new(Method::Get, "/campaigns/c-1"))
        .await
        .unwrap();
    assert_eq!(value, serde_json::json!({"id": "c-1"}));
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let (url, _rx) = serve_once(204, "").await;
    let value = executor(&url)
        .execute(ExecuteRequest::new(Method::Delete, "/campaigns/c-1"))
        .await
        .unwrap();
    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn test_replay_sends_idempotency_key_and_payload() {
    let (url, rx) = serve_once(201, "{}").await;
    let queued = QueuedRequest::from_new(
        NewRequest::new(Method::Post, "campaigns")
            .payload(serde_json::json!({"name": "spring"}))
            .priority(Priority::High),
        1_000,
        0,
        3,
    );

    executor(&url).execute(ExecuteRequest::from_queued(&queued)).await.unwrap();

    let raw = rx.await.unwrap();
    let lower = raw.to_ascii_lowercase();
    assert!(raw.starts_with("POST /campaigns "));
    assert!(lower.contains(&format!("idempotency-key: {}", queued.id)));
    assert!(lower.contains("authorization: bearer secret"));
    assert!(raw.contains(r#"{"name":"spring"}"#));
}

#[parameterized(
    bad_request = { 400, false },
    not_found = { 404, false },
    too_many = { 429, false },
    internal = { 500, true },
    unavailable = { 503, true },
)]
fn test_status_classification(status: u16, retryable: bool) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (url, _rx) = serve_once(status, "nope").await;
        let err = executor(&url)
            .execute(ExecuteRequest::new(Method::Post, "/x"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(status));
        assert_eq!(err.is_retryable(), retryable);
    });
}

#[tokio::test]
async fn test_refused_connection_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = executor(&format!("http://{addr}"))
        .execute(ExecuteRequest::new(Method::Get, "/x"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TransientNetwork(_)), "got {err:?}");
    assert!(err.is_retryable());
}

#[test]
fn test_url_for_joins_and_passes_absolute() {
    let executor = HttpExecutor::new("https://api.test/v1/", Duration::from_secs(1), None).unwrap();
    assert_eq!(executor.url_for("/campaigns"), "https://api.test/v1/campaigns");
    assert_eq!(executor.url_for("campaigns"), "https://api.test/v1/campaigns");
    assert_eq!(executor.url_for("https://other.test/x"), "https://other.test/x");
}

#[test]
fn test_header_lookup_is_case_insensitive() {
    let request = ExecuteRequest::new(Method::Get, "/").header("Idempotency-Key", "req-1");
    assert_eq!(request.header_value("idempotency-key"), Some("req-1"));
}
