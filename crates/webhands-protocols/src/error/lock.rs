//! Profile lock errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    /// The lock is held by another live process. Not retried automatically.
    #[error(
        "profile '{profile}' is in use by pid {holder}; wait for the other \
         session to finish or use a different browserProfile"
    )]
    ProfileBusy { profile: String, holder: u32 },

    #[error("lock file is unreadable: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_busy_message_suggests_waiting() {
        let err = LockError::ProfileBusy {
            profile: "work".to_string(),
            holder: 4242,
        };
        let msg = err.to_string();
        assert!(msg.contains("work"));
        assert!(msg.contains("4242"));
        assert!(msg.contains("wait"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LockError = io.into();
        assert!(err.to_string().contains("denied"));
    }
}
