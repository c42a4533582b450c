//! HTTP server and routing.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::warn;

use webhands_protocols::cdp::BrowserVersion;

use crate::connection::{run_client_socket, run_extension_socket, CLOSE_UNAUTHORIZED};
use crate::RelayState;

/// Create the Axum router for the relay.
pub fn create_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/json/version", get(version_descriptor))
        .route("/extension", get(extension_ws_handler))
        .route("/cdp", get(client_ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Plain liveness probe.
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Discovery descriptor in the shape CDP clients expect from a browser.
async fn version_descriptor(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    Json(BrowserVersion {
        browser: "Chrome/124.0.0.0".to_string(),
        protocol_version: "1.3".to_string(),
        user_agent: "WebHands-Relay".to_string(),
        v8_version: Some("12.4.254".to_string()),
        web_socket_debugger_url: state.client_ws_url(),
    })
}

async fn client_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<RelayState>>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        if !authorized(&state, params.get("token").map(|t| t.as_str())) {
            reject_unauthorized(socket, "client").await;
            return;
        }
        run_client_socket(socket, state).await;
    })
}

async fn extension_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<RelayState>>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        if !authorized(&state, params.get("token").map(|t| t.as_str())) {
            reject_unauthorized(socket, "extension").await;
            return;
        }
        run_extension_socket(socket, state).await;
    })
}

fn authorized(state: &RelayState, token: Option<&str>) -> bool {
    match state.config.required_token() {
        Some(required) => token == Some(required),
        None => true,
    }
}

async fn reject_unauthorized(mut socket: WebSocket, peer_kind: &str) {
    warn!(peer = peer_kind, "rejecting socket with bad token");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_UNAUTHORIZED,
            reason: "unauthorized".into(),
        })))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelayConfig;

    #[test]
    fn test_create_router() {
        let state = Arc::new(RelayState::new(RelayConfig::default()));
        let _router = create_router(state);
    }

    #[test]
    fn test_authorized_without_token_requirement() {
        let state = RelayState::new(RelayConfig::default());
        assert!(authorized(&state, None));
        assert!(authorized(&state, Some("anything")));
    }

    #[test]
    fn test_authorized_with_token_requirement() {
        let state = RelayState::new(RelayConfig {
            token: Some("secret".to_string()),
            ..Default::default()
        });
        assert!(authorized(&state, Some("secret")));
        assert!(!authorized(&state, Some("wrong")));
        assert!(!authorized(&state, None));
    }
}
