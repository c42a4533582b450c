//! Target/session correlation maps.
//!
//! Built from `Target.attachedToTarget` / `Target.detachedFromTarget` events
//! observed on the extension connection, applied strictly in arrival order.

use std::collections::HashMap;

/// Bidirectional `targetId ⇄ sessionId` maps plus the most recently attached
/// session.
#[derive(Debug, Default)]
pub struct SessionMap {
    target_to_session: HashMap<String, String>,
    session_to_target: HashMap<String, String>,
    latest_session_id: Option<String>,
}

impl SessionMap {
    pub fn record_attached(&mut self, target_id: &str, session_id: &str) {
        self.target_to_session
            .insert(target_id.to_string(), session_id.to_string());
        self.session_to_target
            .insert(session_id.to_string(), target_id.to_string());
        self.latest_session_id = Some(session_id.to_string());
    }

    /// Remove a detached session; if it was the latest, promote an arbitrary
    /// remaining one.
    pub fn record_detached(&mut self, session_id: &str) {
        if let Some(target_id) = self.session_to_target.remove(session_id) {
            self.target_to_session.remove(&target_id);
        }
        if self.latest_session_id.as_deref() == Some(session_id) {
            self.latest_session_id = self.session_to_target.keys().next().cloned();
        }
    }

    pub fn session_for_target(&self, target_id: &str) -> Option<&str> {
        self.target_to_session.get(target_id).map(|s| s.as_str())
    }

    pub fn latest_session(&self) -> Option<&str> {
        self.latest_session_id.as_deref()
    }

    pub fn target_ids(&self) -> Vec<String> {
        self.target_to_session.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.target_to_session.is_empty()
    }

    pub fn clear(&mut self) {
        self.target_to_session.clear();
        self.session_to_target.clear();
        self.latest_session_id = None;
    }
}
