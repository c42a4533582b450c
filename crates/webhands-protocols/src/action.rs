//! Action data model: wire-level actions, canonical actions, result records.
//!
//! Wire input accepts several synonymous spellings per action type for
//! ergonomic use by agents ("goto", "open" and "visit" all mean "navigate").
//! [`RawAction::normalize`] maps every accepted spelling onto one canonical
//! [`Action`] variant at the boundary; everything past the boundary operates
//! on canonical tags only.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RequestError;

/// Default character cap for `extract_text`.
pub const DEFAULT_EXTRACT_MAX_CHARS: usize = 5000;

/// A page load state a conditional wait can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

impl LoadState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "load" => Some(Self::Load),
            "domcontentloaded" | "dom_content_loaded" => Some(Self::DomContentLoaded),
            "networkidle" | "network_idle" => Some(Self::NetworkIdle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "domcontentloaded",
            Self::NetworkIdle => "networkidle",
        }
    }
}

/// An action as it arrives on the wire, before normalization.
///
/// All fields are optional except the type tag; which fields are required
/// depends on the canonical action the tag normalizes to.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAction {
    /// Action type string (aliases accepted, see module docs).
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Option<String>,
    pub selector: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub submit: bool,
    pub key: Option<String>,
    #[serde(alias = "timeout", alias = "duration_ms")]
    pub ms: Option<u64>,
    #[serde(alias = "url_glob")]
    pub url_glob: Option<String>,
    #[serde(alias = "load_state")]
    pub load_state: Option<String>,
    #[serde(alias = "predicate_expr", alias = "predicateExpr")]
    pub predicate: Option<String>,
    #[serde(alias = "timeout_ms")]
    pub timeout_ms: Option<u64>,
    #[serde(alias = "max_chars")]
    pub max_chars: Option<usize>,
    pub path: Option<String>,
    #[serde(default, alias = "full_page")]
    pub full_page: bool,
    #[serde(alias = "script", alias = "code")]
    pub expression: Option<String>,
    pub dx: Option<f64>,
    pub dy: Option<f64>,
}

impl RawAction {
    /// Normalize the wire action into its canonical form.
    ///
    /// `index` is the action's position in the request, used for error
    /// reporting only.
    pub fn normalize(&self, index: usize) -> Result<Action, RequestError> {
        let invalid = |reason: &str| RequestError::InvalidAction {
            index,
            reason: reason.to_string(),
        };

        let tag = self.kind.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match tag.as_str() {
            "navigate" | "goto" | "open" | "visit" => Ok(Action::Navigate {
                url: self.url.clone().ok_or_else(|| invalid("navigate requires 'url'"))?,
            }),
            "click" | "tap" => Ok(Action::Click {
                selector: self
                    .selector
                    .clone()
                    .ok_or_else(|| invalid("click requires 'selector'"))?,
            }),
            "type" | "fill" | "input" => Ok(Action::Type {
                selector: self
                    .selector
                    .clone()
                    .ok_or_else(|| invalid("type requires 'selector'"))?,
                text: self.text.clone().ok_or_else(|| invalid("type requires 'text'"))?,
                submit: self.submit,
            }),
            "press_key" | "presskey" | "press" | "key" => Ok(Action::PressKey {
                key: self.key.clone().ok_or_else(|| invalid("press_key requires 'key'"))?,
            }),
            // A "wait" with any condition field is a conditional wait; a bare
            // "wait" needs a duration.
            "wait" | "sleep" | "delay" => {
                if self.has_wait_condition() {
                    self.normalize_wait_for(index)
                } else {
                    Ok(Action::Wait {
                        ms: self
                            .ms
                            .ok_or_else(|| invalid("wait requires 'ms' or a condition"))?,
                    })
                }
            }
            "wait_for" | "waitfor" | "wait_until" | "waituntil" | "conditional_wait" => {
                self.normalize_wait_for(index)
            }
            "extract_text" | "extracttext" | "get_text" | "text" | "extract" => {
                Ok(Action::ExtractText {
                    selector: self.selector.clone(),
                    max_chars: self.max_chars.unwrap_or(DEFAULT_EXTRACT_MAX_CHARS),
                })
            }
            "screenshot" | "capture" => Ok(Action::Screenshot {
                path: self.path.clone(),
                full_page: self.full_page,
            }),
            "evaluate" | "eval" | "js" | "execute_js" => Ok(Action::Evaluate {
                expression: self
                    .expression
                    .clone()
                    .ok_or_else(|| invalid("evaluate requires 'expression'"))?,
            }),
            "scroll" | "scroll_by" => Ok(Action::Scroll {
                dx: self.dx.unwrap_or(0.0),
                dy: self.dy.unwrap_or(0.0),
            }),
            other => Err(RequestError::InvalidAction {
                index,
                reason: format!("unknown action type '{}'", other),
            }),
        }
    }

    fn has_wait_condition(&self) -> bool {
        self.selector.is_some()
            || self.url_glob.is_some()
            || self.load_state.is_some()
            || self.predicate.is_some()
    }

    fn normalize_wait_for(&self, index: usize) -> Result<Action, RequestError> {
        if !self.has_wait_condition() {
            return Err(RequestError::InvalidAction {
                index,
                reason: "wait_for requires at least one of 'selector', 'urlGlob', \
                         'loadState', 'predicate'"
                    .to_string(),
            });
        }
        let load_state = match &self.load_state {
            Some(s) => Some(LoadState::parse(s).ok_or_else(|| RequestError::InvalidAction {
                index,
                reason: format!("unknown load state '{}'", s),
            })?),
            None => None,
        };
        Ok(Action::WaitFor {
            selector: self.selector.clone(),
            url_glob: self.url_glob.clone(),
            load_state,
            predicate: self.predicate.clone(),
            timeout_ms: self.timeout_ms,
        })
    }
}

/// Canonical action, dispatched by the execution engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Navigate {
        url: String,
    },
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
        submit: bool,
    },
    PressKey {
        key: String,
    },
    /// Bare timed wait.
    Wait {
        ms: u64,
    },
    /// Conditional wait; every set condition must be satisfied.
    WaitFor {
        selector: Option<String>,
        url_glob: Option<String>,
        load_state: Option<LoadState>,
        predicate: Option<String>,
        timeout_ms: Option<u64>,
    },
    ExtractText {
        selector: Option<String>,
        max_chars: usize,
    },
    Screenshot {
        path: Option<String>,
        full_page: bool,
    },
    Evaluate {
        expression: String,
    },
    Scroll {
        dx: f64,
        dy: f64,
    },
}

impl Action {
    /// Canonical tag string, echoed in result records.
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Navigate { .. } => "navigate",
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::PressKey { .. } => "press_key",
            Action::Wait { .. } => "wait",
            Action::WaitFor { .. } => "wait_for",
            Action::ExtractText { .. } => "extract_text",
            Action::Screenshot { .. } => "screenshot",
            Action::Evaluate { .. } => "evaluate",
            Action::Scroll { .. } => "scroll",
        }
    }
}

/// Outcome record for one executed action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Canonical action tag.
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,
}

impl ActionResult {
    pub fn new(action: &Action) -> Self {
        Self {
            action: action.tag().to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: &str) -> RawAction {
        RawAction {
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_navigate_aliases() {
        for alias in ["navigate", "goto", "open", "visit", "GOTO"] {
            let mut a = raw(alias);
            a.url = Some("https://example.com".to_string());
            let action = a.normalize(0).unwrap();
            assert_eq!(action.tag(), "navigate");
        }
    }

    #[test]
    fn test_navigate_missing_url() {
        let err = raw("navigate").normalize(3).unwrap_err();
        assert!(err.to_string().contains("index 3"));
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn test_type_aliases() {
        for alias in ["type", "fill", "input"] {
            let mut a = raw(alias);
            a.selector = Some("#q".to_string());
            a.text = Some("hello".to_string());
            assert_eq!(a.normalize(0).unwrap().tag(), "type");
        }
    }

    #[test]
    fn test_press_key_aliases() {
        for alias in ["press_key", "presskey", "press", "key", "press-key"] {
            let mut a = raw(alias);
            a.key = Some("Enter".to_string());
            assert_eq!(a.normalize(0).unwrap().tag(), "press_key");
        }
    }

    #[test]
    fn test_bare_wait() {
        let mut a = raw("wait");
        a.ms = Some(500);
        assert_eq!(a.normalize(0).unwrap(), Action::Wait { ms: 500 });
    }

    #[test]
    fn test_wait_with_condition_becomes_wait_for() {
        let mut a = raw("wait");
        a.selector = Some("#done".to_string());
        let action = a.normalize(0).unwrap();
        assert_eq!(action.tag(), "wait_for");
    }

    #[test]
    fn test_wait_without_anything_is_invalid() {
        assert!(raw("wait").normalize(0).is_err());
    }

    #[test]
    fn test_wait_for_requires_condition() {
        let err = raw("wait_for").normalize(0).unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }

    #[test]
    fn test_wait_for_load_state() {
        let mut a = raw("wait_until");
        a.load_state = Some("networkidle".to_string());
        match a.normalize(0).unwrap() {
            Action::WaitFor { load_state, .. } => {
                assert_eq!(load_state, Some(LoadState::NetworkIdle));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_wait_for_bad_load_state() {
        let mut a = raw("wait_for");
        a.load_state = Some("idle-ish".to_string());
        assert!(a.normalize(0).is_err());
    }

    #[test]
    fn test_extract_text_defaults() {
        let action = raw("extract_text").normalize(0).unwrap();
        assert_eq!(
            action,
            Action::ExtractText {
                selector: None,
                max_chars: DEFAULT_EXTRACT_MAX_CHARS,
            }
        );
    }

    #[test]
    fn test_evaluate_aliases() {
        for alias in ["evaluate", "eval", "js", "execute_js"] {
            let mut a = raw(alias);
            a.expression = Some("1 + 1".to_string());
            assert_eq!(a.normalize(0).unwrap().tag(), "evaluate");
        }
    }

    #[test]
    fn test_unknown_type() {
        let err = raw("teleport").normalize(0).unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn test_raw_action_deserialization_camel_case() {
        let json = r#"{"type": "wait_for", "urlGlob": "https://*/done", "timeoutMs": 1000}"#;
        let a: RawAction = serde_json::from_str(json).unwrap();
        assert_eq!(a.url_glob.as_deref(), Some("https://*/done"));
        assert_eq!(a.timeout_ms, Some(1000));
    }

    #[test]
    fn test_load_state_parse() {
        assert_eq!(LoadState::parse("Load"), Some(LoadState::Load));
        assert_eq!(
            LoadState::parse("domcontentloaded"),
            Some(LoadState::DomContentLoaded)
        );
        assert_eq!(LoadState::parse("bogus"), None);
    }
}
