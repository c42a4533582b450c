//! CDP message handling.
//!
//! The client-side method state machine lives entirely in the relay because
//! no real browser process sits behind it: target discovery and attachment
//! are answered from the session maps, everything else is forwarded to the
//! extension as a `forwardCDPCommand` envelope. Extension replies broadcast
//! verbatim; extension events update the maps and then broadcast.

use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use webhands_protocols::cdp::{CdpCommand, TargetInfo};

use crate::{PeerMessage, RelayState};

/// Methods that may be forwarded without a tab session: browser-level calls
/// are meaningful on their own.
const SESSION_OPTIONAL_METHODS: &[&str] = &[
    "Browser.close",
    "Browser.getVersion",
    "Browser.setDownloadBehavior",
    "Security.setIgnoreCertificateErrors",
    "Target.setAutoAttach",
    "Target.setDiscoverTargets",
];

/// Handle one command frame from a CDP client.
pub(crate) async fn handle_client_command(state: &RelayState, client_id: &str, text: &str) {
    let command: CdpCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(client = %client_id, "unparsable client frame: {}", e);
            return;
        }
    };

    trace!(client = %client_id, method = %command.method, id = command.id, "client command");

    match command.method.as_str() {
        // No browser process exists behind the relay; synthesize.
        "Browser.getVersion" => {
            respond(
                state,
                client_id,
                command.id,
                json!({
                    "protocolVersion": "1.3",
                    "product": "Chrome/124.0.0.0",
                    "revision": "@relay",
                    "userAgent": "WebHands-Relay",
                    "jsVersion": "12.4.254",
                }),
            )
            .await;
        }

        "Target.setDiscoverTargets" | "Target.setAutoAttach" | "Target.detachFromTarget"
        | "Target.activateTarget" => {
            respond(state, client_id, command.id, json!({})).await;
        }

        "Target.getTargets" => {
            let target_infos: Vec<TargetInfo> = {
                let sessions = state.sessions.lock();
                sessions
                    .target_ids()
                    .into_iter()
                    .map(|target_id| TargetInfo {
                        target_id,
                        target_type: "page".to_string(),
                        title: String::new(),
                        url: String::new(),
                        attached: Some(true),
                        browser_context_id: None,
                    })
                    .collect()
            };
            respond(
                state,
                client_id,
                command.id,
                json!({"targetInfos": target_infos}),
            )
            .await;
        }

        "Target.attachToTarget" => {
            let requested = command
                .params
                .as_ref()
                .and_then(|p| p.get("targetId"))
                .and_then(|t| t.as_str());

            let session_id = {
                let sessions = state.sessions.lock();
                requested
                    .and_then(|t| sessions.session_for_target(t))
                    .or_else(|| sessions.latest_session())
                    .map(|s| s.to_string())
            };

            match session_id {
                Some(session_id) => {
                    respond(
                        state,
                        client_id,
                        command.id,
                        json!({"sessionId": session_id}),
                    )
                    .await;
                }
                None => {
                    respond_error(
                        state,
                        client_id,
                        command.id,
                        "no attached target is available",
                    )
                    .await;
                }
            }
        }

        _ => forward_to_extension(state, client_id, command).await,
    }
}

/// Forward an arbitrary method to the extension, resolving the session id
/// from the request, its params, or the last-known session.
async fn forward_to_extension(state: &RelayState, client_id: &str, command: CdpCommand) {
    let id = command.id;
    let session_id = command
        .session_id
        .clone()
        .or_else(|| {
            command
                .params
                .as_ref()
                .and_then(|p| p.get("sessionId"))
                .and_then(|s| s.as_str())
                .map(|s| s.to_string())
        })
        .or_else(|| state.sessions.lock().latest_session().map(|s| s.to_string()));

    if session_id.is_none() && !SESSION_OPTIONAL_METHODS.contains(&command.method.as_str()) {
        respond_error(
            state,
            client_id,
            id,
            &format!("no active tab session for method {}", command.method),
        )
        .await;
        return;
    }

    let envelope = json!({
        "method": "forwardCDPCommand",
        "params": {
            "id": id,
            "method": command.method,
            "params": command.params,
            "sessionId": session_id,
        }
    });

    let extension = state.extension.read().await;
    match extension.as_ref() {
        Some(peer) => {
            debug!(id, "forwarding command to extension");
            peer.send(envelope.to_string()).await;
        }
        None => {
            drop(extension);
            respond_error(state, client_id, id, "no extension is connected to the relay")
                .await;
        }
    }
}

/// Handle one frame from the extension.
pub(crate) async fn handle_extension_message(state: &RelayState, text: &str) {
    let message: Value = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("unparsable extension frame: {}", e);
            return;
        }
    };

    // A numeric id with a result or error is a reply to a forwarded command;
    // broadcast it verbatim.
    if message.get("id").and_then(|i| i.as_u64()).is_some()
        && (message.get("result").is_some() || message.get("error").is_some())
    {
        state.broadcast_to_clients(text).await;
        return;
    }

    match message.get("method").and_then(|m| m.as_str()) {
        Some("forwardCDPEvent") => {
            let Some(event) = message.get("params") else {
                return;
            };
            track_session_events(state, event);
            state.broadcast_to_clients(&event.to_string()).await;
        }
        Some(other) => debug!(method = %other, "ignoring extension message"),
        None => {}
    }
}

/// Maintain the target/session maps from attach/detach events.
fn track_session_events(state: &RelayState, event: &Value) {
    match event.get("method").and_then(|m| m.as_str()) {
        Some("Target.attachedToTarget") => {
            let session_id = event.pointer("/params/sessionId").and_then(|s| s.as_str());
            let target_id = event
                .pointer("/params/targetInfo/targetId")
                .and_then(|t| t.as_str());
            if let (Some(session_id), Some(target_id)) = (session_id, target_id) {
                debug!(session = %session_id, target = %target_id, "target attached");
                state.sessions.lock().record_attached(target_id, session_id);
            }
        }
        Some("Target.detachedFromTarget") => {
            if let Some(session_id) =
                event.pointer("/params/sessionId").and_then(|s| s.as_str())
            {
                debug!(session = %session_id, "target detached");
                state.sessions.lock().record_detached(session_id);
            }
        }
        _ => {}
    }
}

async fn respond(state: &RelayState, client_id: &str, id: u64, result: Value) {
    send_to_client(state, client_id, json!({"id": id, "result": result})).await;
}

async fn respond_error(state: &RelayState, client_id: &str, id: u64, message: &str) {
    send_to_client(
        state,
        client_id,
        json!({"id": id, "error": {"code": -32000, "message": message}}),
    )
    .await;
}

async fn send_to_client(state: &RelayState, client_id: &str, payload: Value) {
    let tx = state.clients.get(client_id).map(|peer| peer.tx.clone());
    if let Some(tx) = tx {
        let _ = tx.send(PeerMessage::Text(payload.to_string())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientPeer, ExtensionPeer, RelayConfig};
    use tokio::sync::mpsc;

    async fn state_with_client() -> (RelayState, mpsc::Receiver<PeerMessage>) {
        let state = RelayState::new(RelayConfig::default());
        let (tx, rx) = mpsc::channel(16);
        state.clients.insert(
            "c1".to_string(),
            ClientPeer {
                id: "c1".to_string(),
                tx,
            },
        );
        (state, rx)
    }

    async fn next_json(rx: &mut mpsc::Receiver<PeerMessage>) -> Value {
        match rx.recv().await.unwrap() {
            PeerMessage::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected peer message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_browser_get_version_is_synthesized() {
        let (state, mut rx) = state_with_client().await;
        handle_client_command(&state, "c1", r#"{"id":1,"method":"Browser.getVersion"}"#)
            .await;
        let reply = next_json(&mut rx).await;
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["protocolVersion"], "1.3");
        assert!(reply["result"]["product"].as_str().unwrap().contains("Chrome"));
    }

    #[tokio::test]
    async fn test_discover_and_auto_attach_are_acked() {
        let (state, mut rx) = state_with_client().await;
        for (id, method) in [(1, "Target.setDiscoverTargets"), (2, "Target.setAutoAttach")] {
            let frame = format!(r#"{{"id":{},"method":"{}"}}"#, id, method);
            handle_client_command(&state, "c1", &frame).await;
            let reply = next_json(&mut rx).await;
            assert_eq!(reply["id"], id);
            assert_eq!(reply["result"], json!({}));
        }
    }

    #[tokio::test]
    async fn test_attach_to_target_returns_mapped_session() {
        let (state, mut rx) = state_with_client().await;
        state.sessions.lock().record_attached("T1", "S1");
        state.sessions.lock().record_attached("T2", "S2");

        handle_client_command(
            &state,
            "c1",
            r#"{"id":5,"method":"Target.attachToTarget","params":{"targetId":"T1"}}"#,
        )
        .await;
        let reply = next_json(&mut rx).await;
        assert_eq!(reply["result"]["sessionId"], "S1");
    }

    #[tokio::test]
    async fn test_attach_to_unknown_target_falls_back_to_latest() {
        let (state, mut rx) = state_with_client().await;
        state.sessions.lock().record_attached("T1", "S1");

        handle_client_command(
            &state,
            "c1",
            r#"{"id":5,"method":"Target.attachToTarget","params":{"targetId":"TX"}}"#,
        )
        .await;
        let reply = next_json(&mut rx).await;
        assert_eq!(reply["result"]["sessionId"], "S1");
    }

    #[tokio::test]
    async fn test_attach_with_no_sessions_errors() {
        let (state, mut rx) = state_with_client().await;
        handle_client_command(
            &state,
            "c1",
            r#"{"id":5,"method":"Target.attachToTarget"}"#,
        )
        .await;
        let reply = next_json(&mut rx).await;
        assert_eq!(
            reply["error"]["message"],
            "no attached target is available"
        );
    }

    #[tokio::test]
    async fn test_get_targets_synthesizes_tracked_targets() {
        let (state, mut rx) = state_with_client().await;
        state.sessions.lock().record_attached("T1", "S1");

        handle_client_command(&state, "c1", r#"{"id":9,"method":"Target.getTargets"}"#)
            .await;
        let reply = next_json(&mut rx).await;
        let infos = reply["result"]["targetInfos"].as_array().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0]["targetId"], "T1");
        assert_eq!(infos[0]["type"], "page");
    }

    #[tokio::test]
    async fn test_forward_without_session_fails_for_session_methods() {
        let (state, mut rx) = state_with_client().await;
        handle_client_command(
            &state,
            "c1",
            r#"{"id":3,"method":"Runtime.evaluate","params":{"expression":"1"}}"#,
        )
        .await;
        let reply = next_json(&mut rx).await;
        assert_eq!(
            reply["error"]["message"],
            "no active tab session for method Runtime.evaluate"
        );
    }

    #[tokio::test]
    async fn test_forward_wraps_command_in_envelope() {
        let (state, mut rx) = state_with_client().await;
        state.sessions.lock().record_attached("T1", "S1");

        let (ext_tx, mut ext_rx) = mpsc::channel(16);
        *state.extension.write().await = Some(ExtensionPeer {
            id: "ext".to_string(),
            tx: ext_tx,
        });

        handle_client_command(
            &state,
            "c1",
            r#"{"id":7,"method":"Runtime.evaluate","params":{"expression":"1"}}"#,
        )
        .await;

        let envelope = next_json(&mut ext_rx).await;
        assert_eq!(envelope["method"], "forwardCDPCommand");
        assert_eq!(envelope["params"]["id"], 7);
        assert_eq!(envelope["params"]["method"], "Runtime.evaluate");
        assert_eq!(envelope["params"]["sessionId"], "S1");

        // The client got nothing yet; the reply will come from the extension.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_forward_without_extension_errors() {
        let (state, mut rx) = state_with_client().await;
        state.sessions.lock().record_attached("T1", "S1");

        handle_client_command(&state, "c1", r#"{"id":7,"method":"Page.reload"}"#).await;
        let reply = next_json(&mut rx).await;
        assert!(reply["error"]["message"]
            .as_str()
            .unwrap()
            .contains("no extension"));
    }

    #[tokio::test]
    async fn test_extension_reply_broadcasts_verbatim() {
        let (state, mut rx) = state_with_client().await;
        let reply = r#"{"id":7,"result":{"value":42}}"#;
        handle_extension_message(&state, reply).await;
        let received = next_json(&mut rx).await;
        assert_eq!(received["id"], 7);
        assert_eq!(received["result"]["value"], 42);
    }

    #[tokio::test]
    async fn test_extension_event_updates_maps_and_broadcasts() {
        let (state, mut rx) = state_with_client().await;
        let event = r#"{"method":"forwardCDPEvent","params":{"method":"Target.attachedToTarget","params":{"sessionId":"S9","targetInfo":{"targetId":"T9","type":"page"}}}}"#;
        handle_extension_message(&state, event).await;

        assert_eq!(
            state.sessions.lock().session_for_target("T9"),
            Some("S9")
        );
        let received = next_json(&mut rx).await;
        assert_eq!(received["method"], "Target.attachedToTarget");
    }

    #[tokio::test]
    async fn test_extension_detach_event_removes_mapping() {
        let (state, _rx) = state_with_client().await;
        state.sessions.lock().record_attached("T9", "S9");

        let event = r#"{"method":"forwardCDPEvent","params":{"method":"Target.detachedFromTarget","params":{"sessionId":"S9"}}}"#;
        handle_extension_message(&state, event).await;
        assert!(state.sessions.lock().session_for_target("T9").is_none());
    }

    #[tokio::test]
    async fn test_session_optional_method_forwards_without_session() {
        let (state, mut rx) = state_with_client().await;
        let (ext_tx, mut ext_rx) = mpsc::channel(16);
        *state.extension.write().await = Some(ExtensionPeer {
            id: "ext".to_string(),
            tx: ext_tx,
        });

        handle_client_command(
            &state,
            "c1",
            r#"{"id":1,"method":"Browser.setDownloadBehavior","params":{"behavior":"deny"}}"#,
        )
        .await;

        let envelope = next_json(&mut ext_rx).await;
        assert_eq!(envelope["params"]["method"], "Browser.setDownloadBehavior");
        assert!(envelope["params"]["sessionId"].is_null());
        assert!(rx.try_recv().is_err());
    }
}
