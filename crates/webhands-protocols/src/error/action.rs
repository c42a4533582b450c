//! Action execution errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    /// A wait condition stayed unmet for the whole timeout window.
    #[error("wait timed out after {timeout_ms}ms: {condition} not met")]
    WaitTimeout { condition: String, timeout_ms: u64 },

    /// The action's overall timeout elapsed.
    #[error("action '{action}' timed out after {timeout_ms}ms")]
    Timeout { action: String, timeout_ms: u64 },

    /// Screenshot path resolved outside the workspace root.
    #[error("path '{0}' escapes the workspace root")]
    PathEscape(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// Backend (CDP or bridge) failure while executing a page primitive.
    #[error("{0}")]
    Page(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_timeout_names_condition() {
        let err = ActionError::WaitTimeout {
            condition: "selector '#done' visible".to_string(),
            timeout_ms: 5000,
        };
        let msg = err.to_string();
        assert!(msg.contains("#done"));
        assert!(msg.contains("5000ms"));
    }

    #[test]
    fn test_path_escape_display() {
        let err = ActionError::PathEscape("../outside.png".to_string());
        assert!(err.to_string().contains("../outside.png"));
        assert!(err.to_string().contains("workspace"));
    }
}
