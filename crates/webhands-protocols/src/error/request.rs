//! Request validation errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("too many actions: {count} (max {max})")]
    TooManyActions { count: usize, max: usize },

    #[error("invalid action at index {index}: {reason}")]
    InvalidAction { index: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_actions_display() {
        let err = RequestError::TooManyActions { count: 30, max: 25 };
        assert!(err.to_string().contains("30"));
        assert!(err.to_string().contains("25"));
    }
}
