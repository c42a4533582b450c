//! Transport descriptors and the structured request summary.

use serde::{Deserialize, Serialize};

use crate::action::ActionResult;

/// Which transport ended up driving the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    #[serde(rename = "direct-cdp")]
    DirectCdp,
    #[serde(rename = "persistent-context")]
    PersistentContext,
    #[serde(rename = "relay-cdp")]
    RelayCdp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectCdp => "direct-cdp",
            Self::PersistentContext => "persistent-context",
            Self::RelayCdp => "relay-cdp",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured summary returned for a completed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSummary {
    /// Transport that served the request.
    pub transport: TransportKind,
    /// True when an already-running debugging session was re-attached.
    pub reused_existing_session: bool,
    /// Whether the profile persists across invocations.
    pub persistent_profile: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub profile_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_title: Option<String>,
    /// Per-action outcomes, in declaration order.
    pub results: Vec<ActionResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&TransportKind::DirectCdp).unwrap(),
            r#""direct-cdp""#
        );
        assert_eq!(
            serde_json::to_string(&TransportKind::PersistentContext).unwrap(),
            r#""persistent-context""#
        );
        assert_eq!(
            serde_json::to_string(&TransportKind::RelayCdp).unwrap(),
            r#""relay-cdp""#
        );
    }

    #[test]
    fn test_summary_round_trip() {
        let summary = BrowserSummary {
            transport: TransportKind::DirectCdp,
            reused_existing_session: false,
            persistent_profile: true,
            profile_id: Some("work".to_string()),
            profile_dir: "/tmp/profiles/work".to_string(),
            final_url: Some("https://example.com/".to_string()),
            final_title: Some("Example Domain".to_string()),
            results: vec![],
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("reusedExistingSession"));
        let back: BrowserSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.transport, TransportKind::DirectCdp);
        assert_eq!(back.profile_id.as_deref(), Some("work"));
    }
}
