//! Per-socket consumer: answers client requests and forwards the group's
//! broadcasts.

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::hub::AlertHub;

pub const SUBSCRIBED_MESSAGE: &str = "Successfully subscribed to alerts";
pub const UNKNOWN_TYPE_MESSAGE: &str = "Unknown message type";
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON";

/// Server reply to a client frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Pong { timestamp: DateTime<Utc> },
    Subscribed { message: String },
    Error { message: String },
}

impl Reply {
    fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }

    pub fn to_text(&self) -> String {
        // Plain enum of strings and a timestamp; encoding cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Decide the reply to one client text frame.
pub fn reply_to(text: &str) -> Reply {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return Reply::error(INVALID_JSON_MESSAGE),
    };
    match value.get("type").and_then(Value::as_str) {
        Some("ping") => Reply::Pong {
            timestamp: Utc::now(),
        },
        Some("subscribe") => Reply::Subscribed {
            message: SUBSCRIBED_MESSAGE.to_string(),
        },
        _ => Reply::error(UNKNOWN_TYPE_MESSAGE),
    }
}

/// Serve one upgraded socket until either side closes or `shutdown` fires.
pub async fn handle_socket(socket: WebSocket, hub: AlertHub, shutdown: CancellationToken) {
    let connection = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut group_rx = hub.subscribe();
    info!(%connection, group = hub.group(), "WebSocket connected");

    let close_reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break "server shutdown";
            }

            result = group_rx.recv() => match result {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break "send failed";
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%connection, skipped, "Client lagging; frames skipped");
                }
                Err(RecvError::Closed) => break "hub closed",
            },

            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let reply = reply_to(text.as_str());
                    debug!(%connection, ?reply, "Replying to client frame");
                    if sender.send(Message::Text(reply.to_text().into())).await.is_err() {
                        break "send failed";
                    }
                }
                Some(Ok(Message::Close(_))) | None => break "closed by client",
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%connection, error = %e, "WebSocket receive error");
                    break "receive error";
                }
            },
        }
    };

    info!(%connection, reason = close_reason, "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_ping_gets_pong() {
        let reply = reply_to(r#"{"type":"ping","timestamp":"2024-03-01T10:15:00Z"}"#);
        assert!(matches!(reply, Reply::Pong { .. }));
        let value: Value = serde_json::from_str(&reply.to_text()).unwrap();
        assert_eq!(value["type"], "pong");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_subscribe_is_confirmed() {
        assert_eq!(
            reply_to(r#"{"type":"subscribe"}"#).to_text(),
            r#"{"type":"subscribed","message":"Successfully subscribed to alerts"}"#
        );
    }

    #[rstest]
    #[case(r#"{"type":"unsubscribe"}"#, UNKNOWN_TYPE_MESSAGE)]
    #[case(r#"{"action":"ping"}"#, UNKNOWN_TYPE_MESSAGE)]
    #[case(r#"{"type":5}"#, UNKNOWN_TYPE_MESSAGE)]
    #[case("[1,2]", UNKNOWN_TYPE_MESSAGE)]
    #[case("not valid json", INVALID_JSON_MESSAGE)]
    #[case("", INVALID_JSON_MESSAGE)]
    fn test_error_replies(#[case] text: &str, #[case] message: &str) {
        assert_eq!(
            reply_to(text),
            Reply::Error {
                message: message.to_string()
            }
        );
    }
}
