//! CDP client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CdpError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("debugging endpoint not reachable: {0}")]
    EndpointUnreachable(String),

    #[error("protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript error: {0}")]
    JavaScript(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("session closed")]
    SessionClosed,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = CdpError::Protocol {
            code: -32000,
            message: "No target with given id found".to_string(),
        };
        assert!(err.to_string().contains("-32000"));
        assert!(err.to_string().contains("No target"));
    }

    #[test]
    fn test_timeout_display() {
        let err = CdpError::Timeout("Request Page.navigate timed out".to_string());
        assert!(err.to_string().contains("Page.navigate"));
    }
}
