//! WebSocket streaming of committed change events.
//!
//! Connect to `/api/v1/ws/events`. The first message is a full grid
//! snapshot, followed by one `change` message per committed edit and a
//! periodic heartbeat. When the connection falls behind the event buffer a
//! fresh snapshot is sent instead of the missed events.
//!
//! ```text
//! ┌─────────────┐   snapshot, change, change, heartbeat…   ┌─────────────┐
//! │   Browser   │ ◄─────────────────────────────────────── │ Ledger node │
//! └─────────────┘                                          └─────────────┘
//! ```

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{ChangeEvent, GridSnapshot};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::ledger::Ledger;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// WebSocket message types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Full grid state
    Snapshot { snapshot: GridSnapshot },
    /// One committed edit
    Change { event: ChangeEvent },
    /// Keeps idle connections alive
    Heartbeat { timestamp: u64 },
}

/// WebSocket handler for change events
pub async fn ws_events_handler(
    ws: WebSocketUpgrade,
    State(ledger): State<Arc<Ledger>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_event_socket(socket, ledger))
}

async fn handle_event_socket(mut socket: WebSocket, ledger: Arc<Ledger>) {
    info!("WebSocket client connected for change events");

    let (snapshot, mut events) = match ledger.subscribe_with_snapshot().await {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Refusing WebSocket subscriber: {}", e);
            return;
        }
    };
    if let Err(e) = send_message(&mut socket, StreamMessage::Snapshot { snapshot }).await {
        warn!("Failed to send initial snapshot: {}", e);
        return;
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
            event = events.recv() => {
                let message = match event {
                    Ok(event) => StreamMessage::Change { event },
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("WebSocket client lagged by {} events, resending snapshot", skipped);
                        match ledger.snapshot().await {
                            Ok(snapshot) => StreamMessage::Snapshot { snapshot },
                            Err(_) => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Err(e) = send_message(&mut socket, message).await {
                    warn!("Failed to send change event: {}", e);
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let timestamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                if let Err(e) = send_message(&mut socket, StreamMessage::Heartbeat { timestamp }).await {
                    warn!("Failed to send heartbeat: {}", e);
                    break;
                }
            }
        }
    }
}

/// Send a stream message over WebSocket
async fn send_message(socket: &mut WebSocket, message: StreamMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&message).map_err(axum::Error::new)?;
    socket.send(Message::Text(json)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{Cell, Color, CorrelationToken, Identity};

    #[test]
    fn change_message_shape() {
        let event = ChangeEvent {
            sequence: 4,
            cell: Cell::new(1, 2),
            color: Color::from_u32(0xa80020),
            correlation: CorrelationToken::from_bytes([1; 32]),
            signer: Identity::from_bytes([2; 32]),
        };
        let json = serde_json::to_value(StreamMessage::Change { event }).unwrap();
        assert_eq!(json["type"], "change");
        assert_eq!(json["event"]["color"], "#a80020");
        assert_eq!(json["event"]["cell"]["column"], 2);
    }
}
