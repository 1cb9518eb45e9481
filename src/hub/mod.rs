//! Real-time messaging hub at `/chat`.
//!
//! # Message Protocol
//!
//! **Server → Client (on connect):**
//! ```json
//! { "type": "connected", "connectionId": "..." }
//! ```
//!
//! **Client → Server:**
//! ```json
//! { "type": "sendMessage", "user": "ada", "message": "hello" }
//! ```
//!
//! **Server → every client:**
//! ```json
//! { "type": "receiveMessage", "user": "ada", "message": "hello" }
//! ```
//!
//! **Server → Client (bad frame; the connection stays open):**
//! ```json
//! { "type": "error", "message": "..." }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::lifecycle::Shutdown;
use crate::observability::metrics;

const CHANNEL_CAPACITY: usize = 256;
const MAX_USER_LEN: usize = 100;
const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    SendMessage { user: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: Uuid,
    },
    ReceiveMessage {
        user: String,
        message: String,
    },
    Error {
        message: String,
    },
}

impl ServerFrame {
    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize hub frame");
                None
            }
        }
    }
}

/// Fan-out of chat messages to every connected client.
pub struct ChatHub {
    tx: broadcast::Sender<ServerFrame>,
    connections: AtomicUsize,
    shutdown: Arc<Shutdown>,
}

impl ChatHub {
    pub fn new(shutdown: Arc<Shutdown>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            connections: AtomicUsize::new(0),
            shutdown,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Push a message to every client. Returns how many received it.
    pub fn broadcast(&self, user: &str, message: &str) -> usize {
        self.tx
            .send(ServerFrame::ReceiveMessage {
                user: user.to_string(),
                message: message.to_string(),
            })
            .unwrap_or(0)
    }

    async fn run_connection(self: Arc<Self>, socket: WebSocket) {
        let connection_id = Uuid::new_v4();
        self.connections.fetch_add(1, Ordering::Relaxed);
        metrics::record_hub_connections(1.0);
        tracing::info!(%connection_id, "Hub connection opened");

        let (mut sink, mut stream) = socket.split();
        let mut frames = self.tx.subscribe();
        let mut shutdown = self.shutdown.subscribe();

        if let Some(hello) = (ServerFrame::Connected { connection_id }).to_message() {
            if sink.send(hello).await.is_err() {
                self.close(connection_id);
                return;
            }
        }

        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(frame) => {
                        let Some(message) = frame.to_message() else { continue };
                        if sink.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%connection_id, skipped, "Hub client lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(reason) = self.on_text(text.as_str()) {
                            tracing::debug!(%connection_id, %reason, "Rejected hub frame");
                            let reply = ServerFrame::Error { message: reason }.to_message();
                            if let Some(reply) = reply {
                                if sink.send(reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let reply = ServerFrame::Error {
                            message: "binary frames are not supported".to_string(),
                        }
                        .to_message();
                        if let Some(reply) = reply {
                            if sink.send(reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%connection_id, error = %e, "Hub connection error");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        self.close(connection_id);
    }

    fn on_text(&self, text: &str) -> Result<(), String> {
        let ClientFrame::SendMessage { user, message } =
            serde_json::from_str::<ClientFrame>(text).map_err(|e| format!("invalid frame: {e}"))?;

        let user = user.trim();
        if user.is_empty() || user.chars().count() > MAX_USER_LEN {
            return Err(format!("user must be 1 to {MAX_USER_LEN} characters"));
        }
        if message.is_empty() || message.len() > MAX_MESSAGE_LEN {
            return Err(format!("message must be 1 to {MAX_MESSAGE_LEN} bytes"));
        }

        self.broadcast(user, &message);
        Ok(())
    }

    fn close(&self, connection_id: Uuid) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
        metrics::record_hub_connections(-1.0);
        tracing::info!(%connection_id, "Hub connection closed");
    }
}

pub fn router(hub: Arc<ChatHub>) -> Router {
    Router::new().route("/chat", get(connect)).with_state(hub)
}

async fn connect(ws: WebSocketUpgrade, State(hub): State<Arc<ChatHub>>) -> Response {
    ws.on_upgrade(move |socket| hub.run_connection(socket))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> ChatHub {
        ChatHub::new(Arc::new(Shutdown::new()))
    }

    #[test]
    fn test_wire_names() {
        let frame = ServerFrame::Connected {
            connection_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "connected");
        assert!(json.get("connectionId").is_some());

        let parsed: ClientFrame =
            serde_json::from_str(r#"{"type":"sendMessage","user":"ada","message":"hi"}"#).unwrap();
        assert_eq!(
            parsed,
            ClientFrame::SendMessage {
                user: "ada".into(),
                message: "hi".into()
            }
        );
    }

    #[tokio::test]
    async fn test_valid_frame_is_broadcast() {
        let hub = hub();
        let mut rx = hub.tx.subscribe();

        hub.on_text(r#"{"type":"sendMessage","user":" ada ","message":"hi"}"#)
            .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerFrame::ReceiveMessage {
                user: "ada".into(),
                message: "hi".into()
            }
        );
    }

    #[test]
    fn test_bad_frames_are_rejected() {
        let hub = hub();
        assert!(hub.on_text("not json").is_err());
        assert!(hub.on_text(r#"{"type":"shout","user":"a","message":"b"}"#).is_err());
        assert!(hub
            .on_text(r#"{"type":"sendMessage","user":"","message":"b"}"#)
            .is_err());
        assert!(hub
            .on_text(r#"{"type":"sendMessage","user":"a","message":""}"#)
            .is_err());
    }
}
