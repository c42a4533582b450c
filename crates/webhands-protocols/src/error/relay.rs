//! Relay server errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Refused at startup, before binding any socket.
    #[error("relay configuration error: {0}")]
    Config(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("relay is not running")]
    NotRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = RelayError::Config("auth token required but not configured".to_string());
        assert!(err.to_string().contains("auth token"));
    }

    #[test]
    fn test_bind_error_display() {
        let err = RelayError::Bind {
            addr: "127.0.0.1:18792".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:18792"));
    }
}
