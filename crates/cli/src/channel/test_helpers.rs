// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-process transport for channel tests.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use offsync_core::Envelope;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::client::TransportFactory;
use super::transport::{Transport, TransportError, TransportFuture};

#[derive(Default)]
struct ServerState {
    connects: Vec<(String, Instant)>,
    fail_next: usize,
    hang: bool,
    closes: usize,
    fail_closes: bool,
    sent: Vec<Envelope>,
    /// Feeds the live connection. `None` on the wire closes it.
    inbound: Option<mpsc::UnboundedSender<Option<Envelope>>>,
}

/// Controls the far end of every [`MockTransport`] it hands out.
#[derive(Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport factory whose transports all talk to this server.
    pub fn factory(&self) -> TransportFactory {
        let server = self.clone();
        Arc::new(move || Box::new(MockTransport { server: server.clone(), rx: None }) as Box<dyn Transport>)
    }

    /// Makes the next `n` connect attempts fail.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().fail_next = n;
    }

    /// Makes connect attempts never complete.
    pub fn hang_connects(&self) {
        self.state.lock().unwrap().hang = true;
    }

    /// Makes client-side closes report an error.
    pub fn fail_closes(&self) {
        self.state.lock().unwrap().fail_closes = true;
    }

    /// How many times a client closed its end.
    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    /// Pushes a frame to the connected client.
    pub fn push(&self, envelope: Envelope) {
        if let Some(tx) = &self.state.lock().unwrap().inbound {
            let _ = tx.send(Some(envelope));
        }
    }

    /// Closes the live connection from the server side.
    pub fn close(&self) {
        if let Some(tx) = self.state.lock().unwrap().inbound.take() {
            let _ = tx.send(None);
        }
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects.len()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().connects.iter().map(|(_, at)| *at).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().unwrap().connects.iter().map(|(url, _)| url.clone()).collect()
    }

    /// Frames the client sent, in order.
    pub fn sent(&self) -> Vec<Envelope> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_of(&self, kind: &str) -> Vec<Envelope> {
        self.sent().into_iter().filter(|e| e.kind == kind).collect()
    }
}

pub struct MockTransport {
    server: MockServer,
    rx: Option<mpsc::UnboundedReceiver<Option<Envelope>>>,
}

impl Transport for MockTransport {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()> {
        let url = url.to_string();
        Box::pin(async move {
            let hang = {
                let mut state = self.server.state.lock().unwrap();
                state.connects.push((url, Instant::now()));
                if state.fail_next > 0 {
                    state.fail_next -= 1;
                    return Err(TransportError::ConnectionFailed("connection refused".into()));
                }
                state.hang
            };
            if hang {
                std::future::pending::<()>().await;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.server.state.lock().unwrap().inbound = Some(tx);
            self.rx = Some(rx);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.rx = None;
            let mut state = self.server.state.lock().unwrap();
            state.closes += 1;
            if state.fail_closes {
                return Err(TransportError::ConnectionClosed);
            }
            Ok(())
        })
    }

    fn send(&mut self, envelope: Envelope) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.rx.is_none() {
                return Err(TransportError::ConnectionClosed);
            }
            self.server.state.lock().unwrap().sent.push(envelope);
            Ok(())
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<Envelope>> {
        Box::pin(async move {
            let rx = self.rx.as_mut().ok_or(TransportError::ConnectionClosed)?;
            let frame = rx.recv().await;
            match frame {
                Some(Some(envelope)) => Ok(Some(envelope)),
                Some(None) | None => {
                    self.rx = None;
                    Ok(None)
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.rx.is_some()
    }
}
