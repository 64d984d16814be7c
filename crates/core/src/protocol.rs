// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Real-time channel wire format.
//!
//! Every frame in either direction is a JSON object with a `type` string and
//! a `data` payload:
//! - Client sends heartbeats (`ping`) and topic subscriptions (`subscribe`)
//! - Server pushes domain events that invalidate or update cached queries

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const SUBSCRIBE: &str = "subscribe";
pub const REVENUE_UPDATE: &str = "revenue_update";
pub const NEW_CONVERSION: &str = "new_conversion";
pub const NOTIFICATION: &str = "notification";
pub const RESOURCE_UPDATE: &str = "resource_update";

/// A single frame: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Envelope { kind: kind.into(), data }
    }

    /// Creates a heartbeat frame.
    pub fn ping() -> Self {
        Envelope::new(PING, Value::Null)
    }

    /// Creates a topic subscription frame.
    pub fn subscribe(topics: &[String]) -> Self {
        Envelope::new(SUBSCRIBE, serde_json::json!({ "topics": topics }))
    }

    /// Serializes the frame to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes a frame from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Inbound frame classified against the built-in event set.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    RevenueUpdate(Value),
    NewConversion(Value),
    Notification(Notification),
    ResourceUpdate(ResourceUpdate),
    Pong,
    /// Any type this client has no built-in handling for.
    Other(Envelope),
}

/// Payload of a `notification` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Payload of a `resource_update` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUpdate {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ServerEvent {
    /// Classifies a frame. Built-in events with malformed payloads fall back to `Other`.
    pub fn classify(envelope: &Envelope) -> Self {
        match envelope.kind.as_str() {
            REVENUE_UPDATE => ServerEvent::RevenueUpdate(envelope.data.clone()),
            NEW_CONVERSION => ServerEvent::NewConversion(envelope.data.clone()),
            PONG => ServerEvent::Pong,
            NOTIFICATION => match serde_json::from_value(envelope.data.clone()) {
                Ok(n) => ServerEvent::Notification(n),
                Err(_) => ServerEvent::Other(envelope.clone()),
            },
            RESOURCE_UPDATE => match serde_json::from_value(envelope.data.clone()) {
                Ok(u) => ServerEvent::ResourceUpdate(u),
                Err(_) => ServerEvent::Other(envelope.clone()),
            },
            _ => ServerEvent::Other(envelope.clone()),
        }
    }
}

/// Lifecycle state of the real-time connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
    /// Reconnection gave up; live updates are unavailable until `connect` is called again.
    pub exhausted: bool,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
