//! Browser request: the unit of work accepted by the transport layer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::action::{Action, RawAction};
use crate::error::RequestError;

/// Maximum number of actions accepted per request.
pub const MAX_ACTIONS: usize = 25;

/// Default per-action timeout.
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;

/// Lower bound for the per-action timeout.
pub const MIN_ACTION_TIMEOUT_MS: u64 = 1_000;

/// Upper bound for the per-action timeout.
pub const MAX_ACTION_TIMEOUT_MS: u64 = 300_000;

/// Transport preference carried on a request.
///
/// `Auto` tries strategies in order with fallback. An explicit preference
/// pins a single strategy and disables fallback. The relay is never chosen
/// under `Auto` unless it is enabled in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    #[default]
    Auto,
    #[serde(alias = "direct-cdp", alias = "direct_cdp")]
    Cdp,
    #[serde(alias = "persistent-context", alias = "persistent_context")]
    Persistent,
    Relay,
}

/// A browser automation request. Immutable once validated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserRequest {
    /// Optional URL to open before running actions.
    pub start_url: Option<String>,
    /// Ordered action list, max [`MAX_ACTIONS`].
    #[serde(default)]
    pub actions: Vec<RawAction>,
    /// Headless launch; defaults to the configured value when unset.
    pub headless: Option<bool>,
    /// Per-action timeout, clamped to 1s..=300s.
    #[serde(default = "default_timeout")]
    pub per_action_timeout_ms: u64,
    /// Explicit browser executable, overriding discovery.
    pub executable_path: Option<PathBuf>,
    /// Named persistent profile; absent means an ephemeral temp profile.
    pub browser_profile: Option<String>,
    /// Transport strategy preference.
    #[serde(default)]
    pub transport: TransportPreference,
}

fn default_timeout() -> u64 {
    DEFAULT_ACTION_TIMEOUT_MS
}

impl BrowserRequest {
    /// Validate limits and normalize every wire action into canonical form.
    pub fn normalized_actions(&self) -> Result<Vec<Action>, RequestError> {
        if self.actions.len() > MAX_ACTIONS {
            return Err(RequestError::TooManyActions {
                count: self.actions.len(),
                max: MAX_ACTIONS,
            });
        }
        self.actions
            .iter()
            .enumerate()
            .map(|(i, raw)| raw.normalize(i))
            .collect()
    }

    /// Effective per-action timeout, clamped into the permitted range.
    pub fn action_timeout_ms(&self) -> u64 {
        self.per_action_timeout_ms
            .clamp(MIN_ACTION_TIMEOUT_MS, MAX_ACTION_TIMEOUT_MS)
    }
}
