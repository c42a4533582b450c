//! WebSocket peer management.
//!
//! Each accepted socket gets an outbound queue and an independent handler
//! task; peers never block each other. The extension peer additionally runs
//! an application-level `hello` handshake before it is registered, and a new
//! extension connection always evicts the previous one.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::handler;
use crate::RelayState;

/// Close code for failed authentication.
pub(crate) const CLOSE_UNAUTHORIZED: u16 = 4401;

/// Close code for frames above the configured ceiling.
const CLOSE_TOO_BIG: u16 = 1009;

/// Close code used when a newer extension connection takes over.
const CLOSE_REPLACED: u16 = 4000;

/// Outbound instruction for a peer's socket task.
#[derive(Debug)]
pub enum PeerMessage {
    Text(String),
    Close(u16, &'static str),
}

/// A connected CDP client.
pub struct ClientPeer {
    pub id: String,
    pub tx: mpsc::Sender<PeerMessage>,
}

/// The single extension peer.
pub struct ExtensionPeer {
    pub id: String,
    pub tx: mpsc::Sender<PeerMessage>,
}

impl ExtensionPeer {
    pub async fn send(&self, text: String) {
        let _ = self.tx.send(PeerMessage::Text(text)).await;
    }

    pub async fn close(&self) {
        let _ = self
            .tx
            .send(PeerMessage::Close(CLOSE_REPLACED, "replaced"))
            .await;
    }
}

/// Drive a client socket until it disconnects.
pub(crate) async fn run_client_socket(socket: WebSocket, state: Arc<RelayState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut outbound_rx) = mpsc::channel::<PeerMessage>(256);

    state.clients.insert(
        conn_id.clone(),
        ClientPeer {
            id: conn_id.clone(),
            tx,
        },
    );
    info!(client = %conn_id, "CDP client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let max_frame = state.config.max_frame_bytes;

    loop {
        tokio::select! {
            Some(outbound) = outbound_rx.recv() => {
                match outbound {
                    PeerMessage::Text(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    PeerMessage::Close(code, reason) => {
                        let _ = ws_tx.send(close_frame(code, reason)).await;
                        break;
                    }
                }
            }

            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > max_frame {
                            warn!(client = %conn_id, bytes = text.len(), "client frame over limit");
                            let _ = ws_tx.send(close_frame(CLOSE_TOO_BIG, "frame too large")).await;
                            break;
                        }
                        handler::handle_client_command(&state, &conn_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(client = %conn_id, "client socket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    state.clients.remove(&conn_id);
    debug!(client = %conn_id, "CDP client disconnected");
}

/// Drive the extension socket: handshake, register (evicting any previous
/// extension), then relay until disconnect.
pub(crate) async fn run_extension_socket(socket: WebSocket, state: Arc<RelayState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let max_frame = state.config.max_frame_bytes;

    // Handshake: the first frame must be a matching `hello`. Anything else
    // closes the socket.
    let hello_ok = match ws_rx.next().await {
        Some(Ok(Message::Text(text))) => {
            if text.len() > max_frame {
                false
            } else {
                handshake_accepted(&state, text.as_str())
            }
        }
        _ => false,
    };

    if !hello_ok {
        warn!(conn = %conn_id, "extension handshake rejected");
        let _ = ws_tx
            .send(close_frame(CLOSE_UNAUTHORIZED, "handshake failed"))
            .await;
        return;
    }

    let ack = json!({"method": "hello_ack", "params": {"ok": true}}).to_string();
    if ws_tx.send(Message::Text(ack.into())).await.is_err() {
        return;
    }

    let (tx, mut outbound_rx) = mpsc::channel::<PeerMessage>(256);
    let peer = ExtensionPeer {
        id: conn_id.clone(),
        tx,
    };

    // Only one extension at a time: evict the previous peer.
    if let Some(previous) = state.extension.write().await.replace(peer) {
        info!(old = %previous.id, new = %conn_id, "replacing extension connection");
        previous.close().await;
    }
    info!(conn = %conn_id, "extension connected");

    loop {
        tokio::select! {
            Some(outbound) = outbound_rx.recv() => {
                match outbound {
                    PeerMessage::Text(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    PeerMessage::Close(code, reason) => {
                        let _ = ws_tx.send(close_frame(code, reason)).await;
                        break;
                    }
                }
            }

            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > max_frame {
                            warn!(conn = %conn_id, bytes = text.len(), "extension frame over limit");
                            let _ = ws_tx.send(close_frame(CLOSE_TOO_BIG, "frame too large")).await;
                            break;
                        }
                        handler::handle_extension_message(&state, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(conn = %conn_id, "extension socket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    // Clear the slot only if we still own it; an eviction already replaced it.
    let mut slot = state.extension.write().await;
    if slot.as_ref().map(|p| p.id.as_str()) == Some(conn_id.as_str()) {
        *slot = None;
    }
    drop(slot);
    info!(conn = %conn_id, "extension disconnected");
}

/// Validate the extension's `hello` message.
fn handshake_accepted(state: &RelayState, text: &str) -> bool {
    let Ok(message) = serde_json::from_str::<serde_json::Value>(text) else {
        return false;
    };
    if message.get("method").and_then(|m| m.as_str()) != Some("hello") {
        return false;
    }
    match state.config.required_token() {
        Some(required) => {
            message
                .pointer("/params/token")
                .and_then(|t| t.as_str())
                == Some(required)
        }
        None => true,
    }
}

fn close_frame(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelayConfig;

    fn state_with_token(token: Option<&str>) -> RelayState {
        RelayState::new(RelayConfig {
            token: token.map(|t| t.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_handshake_requires_hello_method() {
        let state = state_with_token(None);
        assert!(handshake_accepted(&state, r#"{"method":"hello","params":{}}"#));
        assert!(!handshake_accepted(&state, r#"{"method":"other"}"#));
        assert!(!handshake_accepted(&state, "not json"));
    }

    #[test]
    fn test_handshake_token_enforcement() {
        let state = state_with_token(Some("secret"));
        assert!(handshake_accepted(
            &state,
            r#"{"method":"hello","params":{"token":"secret"}}"#
        ));
        assert!(!handshake_accepted(
            &state,
            r#"{"method":"hello","params":{"token":"wrong"}}"#
        ));
        assert!(!handshake_accepted(&state, r#"{"method":"hello","params":{}}"#));
    }
}
