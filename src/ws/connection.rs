//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching subscription commands and forwarding filtered job events.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::JobEvent;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads subscription commands from the client and applies them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the
///   client.
pub async fn run_connection(socket: WebSocket, mut event_rx: broadcast::Receiver<JobEvent>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs);
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Job event from the EventBus
            event = event_rx.recv() => {
                match event {
                    Ok(job_event) => {
                        if subs.matches(job_event.token_id()) {
                            let msg = WsMessage {
                                id: uuid::Uuid::new_v4().to_string(),
                                msg_type: WsMessageType::Event,
                                timestamp: chrono::Utc::now(),
                                payload: serde_json::to_value(&job_event).unwrap_or_default(),
                            };
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Handles a text message from the client, returning an optional JSON
/// response.
fn handle_text_message(text: &str, subs: &mut SubscriptionManager) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        let err = WsMessage {
            id: String::new(),
            msg_type: WsMessageType::Error,
            timestamp: chrono::Utc::now(),
            payload: serde_json::json!({
                "code": 400,
                "message": "malformed JSON"
            }),
        };
        return serde_json::to_string(&err).ok();
    };

    // Subscribe/unsubscribe commands carry a tokenIds array. Entries are
    // token numbers, numeric strings, or the wildcard "*".
    if let Some(token_ids) = msg.payload.get("tokenIds").and_then(|v| v.as_array()) {
        let command = msg
            .payload
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("subscribe");

        match command {
            "subscribe" => {
                let (ids, wildcard) = parse_token_ids(token_ids);
                subs.subscribe(&ids, wildcard);
                let response = WsMessage {
                    id: msg.id,
                    msg_type: WsMessageType::Response,
                    timestamp: chrono::Utc::now(),
                    payload: serde_json::json!({
                        "subscribed": ids,
                        "count": subs.count(),
                        "wildcard": subs.is_subscribed_all(),
                    }),
                };
                return serde_json::to_string(&response).ok();
            }
            "unsubscribe" => {
                let (ids, _) = parse_token_ids(token_ids);
                subs.unsubscribe(&ids);
                let response = WsMessage {
                    id: msg.id,
                    msg_type: WsMessageType::Response,
                    timestamp: chrono::Utc::now(),
                    payload: serde_json::json!({
                        "unsubscribed": ids,
                        "remainingCount": subs.count(),
                    }),
                };
                return serde_json::to_string(&response).ok();
            }
            _ => {}
        }
    }

    // Unknown command
    let err = WsMessage {
        id: msg.id,
        msg_type: WsMessageType::Error,
        timestamp: chrono::Utc::now(),
        payload: serde_json::json!({
            "code": 404,
            "message": "unknown command"
        }),
    };
    serde_json::to_string(&err).ok()
}

/// Extracts token IDs and the wildcard flag from a JSON array.
fn parse_token_ids(values: &[serde_json::Value]) -> (Vec<u64>, bool) {
    let mut ids = Vec::new();
    let mut wildcard = false;
    for value in values {
        if let Some(id) = value.as_u64() {
            ids.push(id);
        } else if let Some(s) = value.as_str() {
            if s == "*" {
                wildcard = true;
            } else if let Ok(id) = s.parse::<u64>() {
                ids.push(id);
            }
        }
    }
    (ids, wildcard)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_updates_filter() {
        let mut subs = SubscriptionManager::new();
        let text = serde_json::json!({
            "id": "1",
            "type": "command",
            "timestamp": chrono::Utc::now(),
            "payload": { "command": "subscribe", "tokenIds": [42, "7"] }
        })
        .to_string();

        let response = handle_text_message(&text, &mut subs);
        assert!(response.is_some());
        assert!(subs.matches(42));
        assert!(subs.matches(7));
        assert!(!subs.matches(8));
    }

    #[test]
    fn wildcard_string_subscribes_all() {
        let mut subs = SubscriptionManager::new();
        let text = serde_json::json!({
            "id": "1",
            "type": "command",
            "timestamp": chrono::Utc::now(),
            "payload": { "command": "subscribe", "tokenIds": ["*"] }
        })
        .to_string();

        let _ = handle_text_message(&text, &mut subs);
        assert!(subs.matches(123_456));
    }

    #[test]
    fn malformed_json_yields_error_message() {
        let mut subs = SubscriptionManager::new();
        let Some(response) = handle_text_message("not json", &mut subs) else {
            panic!("expected error response");
        };
        assert!(response.contains("malformed JSON"));
    }
}
