//! Playwright bridge errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge failed to start: {0}")]
    StartFailed(String),

    #[error("bridge communication error: {0}")]
    Communication(String),

    /// Error reported by the bridge script itself.
    #[error("bridge error: {0}")]
    Remote(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("bridge not started")]
    NotStarted,

    #[error("Node.js not found; install Node.js >= 18 to use persistent contexts")]
    NodeNotFound,
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Communication(e.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Communication(format!("JSON error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_not_found_mentions_install() {
        assert!(BridgeError::NodeNotFound.to_string().contains("Node.js"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: BridgeError = io.into();
        assert!(err.to_string().contains("pipe closed"));
    }
}
