// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Message-framed connections for the real-time channel.
//!
//! The channel only sees [`Transport`]; a fresh one is built for every
//! connect attempt. [`WebSocketTransport`] is the production implementation.

use std::future::Future;
use std::pin::Pin;

use futures_util::{SinkExt, StreamExt};
use offsync_core::Envelope;
use tokio_tungstenite::tungstenite::Message;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<TransportError> for offsync_core::Error {
    fn from(e: TransportError) -> Self {
        offsync_core::Error::Transport(e.to_string())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>;

/// Duplex, message-framed connection.
pub trait Transport: Send + Sync {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()>;

    fn disconnect(&mut self) -> TransportFuture<'_, ()>;

    fn send(&mut self, envelope: Envelope) -> TransportFuture<'_, ()>;

    /// Receives the next frame. Returns `None` once the peer has closed.
    fn recv(&mut self) -> TransportFuture<'_, Option<Envelope>>;

    fn is_connected(&self) -> bool;
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// What one inbound WebSocket message means for the channel.
enum Frame {
    Event(Envelope),
    Closed,
    Skip,
}

fn decode(message: Message) -> Frame {
    match message {
        Message::Text(text) => match Envelope::from_json(&text) {
            Ok(envelope) => Frame::Event(envelope),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed frame");
                Frame::Skip
            }
        },
        Message::Close(_) => Frame::Closed,
        // Protocol-level ping/pong and binary frames carry no events.
        _ => Frame::Skip,
    }
}

/// JSON text frames over `tokio-tungstenite`.
#[derive(Default)]
pub struct WebSocketTransport {
    socket: Option<WsStream>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn socket(&mut self) -> TransportResult<&mut WsStream> {
        self.socket.as_mut().ok_or(TransportError::ConnectionClosed)
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()> {
        let url = url.to_string();
        Box::pin(async move {
            let (socket, response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            tracing::debug!(status = response.status().as_u16(), "websocket handshake complete");
            self.socket = Some(socket);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if let Some(mut socket) = self.socket.take() {
                // The socket is dropped whether or not the close handshake lands.
                if let Err(e) = socket.close(None).await {
                    tracing::debug!(error = %e, "close handshake failed");
                }
            }
            Ok(())
        })
    }

    fn send(&mut self, envelope: Envelope) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let json = envelope
                .to_json()
                .map_err(|e| TransportError::SerializationError(e.to_string()))?;
            let result = self.socket()?.send(Message::Text(json.into())).await;
            result.map_err(|e| {
                self.socket = None;
                TransportError::SendFailed(e.to_string())
            })
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<Envelope>> {
        Box::pin(async move {
            loop {
                let next = self.socket()?.next().await;
                let frame = match next {
                    Some(Ok(message)) => decode(message),
                    Some(Err(e)) => {
                        self.socket = None;
                        return Err(TransportError::ReceiveFailed(e.to_string()));
                    }
                    None => Frame::Closed,
                };
                match frame {
                    Frame::Event(envelope) => return Ok(Some(envelope)),
                    Frame::Closed => {
                        self.socket = None;
                        return Ok(None);
                    }
                    Frame::Skip => {}
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
