//! Chrome DevTools Protocol wire message shapes.
//!
//! Shared by the CDP client stack (which serializes commands and parses
//! responses) and the relay server (which parses client commands and
//! synthesizes responses), so every type derives both directions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A CDP command: `{ id, method, params?, sessionId? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpCommand {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Any inbound CDP frame: a response (`id` set) or an event (`method` set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CdpErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Error payload inside a CDP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Target descriptor from `Target.getTargets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_context_id: Option<String>,
}

/// Page descriptor from the `/json/list` discovery endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub page_type: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_socket_debugger_url: Option<String>,
}

/// Version descriptor from the `/json/version` discovery endpoint.
///
/// Chrome returns PascalCase field names here; the relay synthesizes the
/// same shape so unmodified CDP clients can consume it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser")]
    pub browser: String,
    #[serde(rename = "Protocol-Version")]
    pub protocol_version: String,
    #[serde(rename = "User-Agent")]
    pub user_agent: String,
    #[serde(rename = "V8-Version", skip_serializing_if = "Option::is_none")]
    pub v8_version: Option<String>,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_serialization_skips_empty_fields() {
        let cmd = CdpCommand {
            id: 1,
            method: "Page.enable".to_string(),
            params: None,
            session_id: None,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"id":1,"method":"Page.enable"}"#);
    }

    #[test]
    fn test_command_session_id_rename() {
        let cmd = CdpCommand {
            id: 7,
            method: "Runtime.evaluate".to_string(),
            params: Some(json!({"expression": "1"})),
            session_id: Some("SESSION1".to_string()),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["sessionId"], "SESSION1");
    }

    #[test]
    fn test_envelope_response_vs_event() {
        let resp: CdpEnvelope =
            serde_json::from_str(r#"{"id": 3, "result": {"ok": true}}"#).unwrap();
        assert_eq!(resp.id, Some(3));
        assert!(resp.method.is_none());

        let event: CdpEnvelope = serde_json::from_str(
            r#"{"method": "Target.attachedToTarget", "params": {"sessionId": "S"}}"#,
        )
        .unwrap();
        assert!(event.id.is_none());
        assert_eq!(event.method.as_deref(), Some("Target.attachedToTarget"));
    }

    #[test]
    fn test_browser_version_pascal_case() {
        let version = BrowserVersion {
            browser: "Chrome/130.0.0.0".to_string(),
            protocol_version: "1.3".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            v8_version: Some("13.0".to_string()),
            web_socket_debugger_url: "ws://127.0.0.1:9222/devtools/browser/x".to_string(),
        };
        let json = serde_json::to_value(&version).unwrap();
        assert!(json.get("Browser").is_some());
        assert!(json.get("Protocol-Version").is_some());
        assert!(json.get("webSocketDebuggerUrl").is_some());
    }
}
