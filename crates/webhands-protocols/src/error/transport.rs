//! Transport negotiation errors.

use thiserror::Error;

use super::LockError;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Bad configuration detected before any resource is acquired.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no browser executable found; set an explicit executablePath")]
    ExecutableNotFound,

    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),

    /// No debugging endpoint was discovered in time; triggers fallback.
    #[error("no debugging endpoint discovered within {0}ms")]
    LaunchTimeout(u64),

    /// Connected, but could not produce a usable page; triggers fallback.
    #[error("attach failed: {0}")]
    AttachFailed(String),

    /// The connection exposed no browsing contexts at all.
    #[error("browser connection exposed no contexts")]
    NoContext,

    /// The relay has no extension-held tab to ride.
    #[error("relay has no attached extension tab: {0}")]
    NoExtension(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Every applicable strategy failed; carries the last concrete error.
    #[error("all transports failed (attempted {attempted}): {last}")]
    Exhausted { attempted: String, last: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_timeout_display() {
        let err = TransportError::LaunchTimeout(10_000);
        assert!(err.to_string().contains("10000ms"));
    }

    #[test]
    fn test_exhausted_names_attempts() {
        let err = TransportError::Exhausted {
            attempted: "persistent-context, direct-cdp".to_string(),
            last: "attach failed: connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("persistent-context"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_lock_error_passthrough() {
        let err: TransportError = LockError::ProfileBusy {
            profile: "work".to_string(),
            holder: 1,
        }
        .into();
        assert!(err.to_string().contains("in use"));
    }
}
