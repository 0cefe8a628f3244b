//! WebSocket message types: envelope and discriminator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}
