//! Page handle abstraction.
//!
//! The action engine drives a `dyn PageHandle` without knowing which
//! transport produced it. Backends differ in wait support: Playwright pages
//! expose native wait primitives, plain CDP sessions do not. The optional
//! [`NativeWaits`] capability makes that difference explicit - when it is
//! absent the engine substitutes its generic polling adapter.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::Value;
use thiserror::Error;

use webhands_protocols::{ActionError, LoadState};

use crate::cdp::{CdpError, PageSession};
use crate::playwright::{BridgeError, PlaywrightBridge};

/// Backend-neutral page operation error.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Backend(String),
}

impl From<CdpError> for PageError {
    fn from(e: CdpError) -> Self {
        match e {
            CdpError::ElementNotFound(s) => PageError::ElementNotFound(s),
            CdpError::Timeout(s) => PageError::Timeout(s),
            other => PageError::Backend(other.to_string()),
        }
    }
}

impl From<BridgeError> for PageError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Timeout(s) => PageError::Timeout(s),
            other => PageError::Backend(other.to_string()),
        }
    }
}

impl From<PageError> for ActionError {
    fn from(e: PageError) -> Self {
        match e {
            PageError::ElementNotFound(s) => ActionError::ElementNotFound(s),
            other => ActionError::Page(other.to_string()),
        }
    }
}

/// Native wait primitives, offered by backends that have them.
#[async_trait]
pub trait NativeWaits: Send + Sync {
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), PageError>;
    async fn wait_for_url_glob(&self, glob: &str, timeout_ms: u64) -> Result<(), PageError>;
    async fn wait_for_load_state(
        &self,
        state: LoadState,
        timeout_ms: u64,
    ) -> Result<(), PageError>;
    async fn wait_for_predicate(&self, expression: &str, timeout_ms: u64)
        -> Result<(), PageError>;
}

/// The operation surface the action engine needs from any page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), PageError>;
    async fn click(&self, selector: &str) -> Result<(), PageError>;
    async fn fill(&self, selector: &str, text: &str) -> Result<(), PageError>;
    async fn press_key(&self, key: &str) -> Result<(), PageError>;
    async fn scroll(&self, dx: f64, dy: f64) -> Result<(), PageError>;
    async fn evaluate(&self, expression: &str) -> Result<Value, PageError>;
    /// Inner text of `selector`, or of the document root when `None`.
    async fn inner_text(&self, selector: Option<&str>) -> Result<String, PageError>;
    /// PNG screenshot bytes.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, PageError>;
    async fn url(&self) -> Result<String, PageError>;
    async fn title(&self) -> Result<String, PageError>;
    async fn selector_visible(&self, selector: &str) -> Result<bool, PageError>;
    async fn ready_state(&self) -> Result<String, PageError>;

    /// Native wait capability, when the backend has one.
    fn native_waits(&self) -> Option<&dyn NativeWaits> {
        None
    }
}

// ============================================================================
// CDP-backed page
// ============================================================================

/// Page handle over a raw CDP session (direct or relay transport).
///
/// Exposes no native waits; the engine polls.
pub struct CdpPage {
    session: PageSession,
}

impl CdpPage {
    pub fn new(session: PageSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        Ok(self.session.navigate(url).await?)
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        Ok(self.session.click_selector(selector).await?)
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), PageError> {
        Ok(self.session.fill(selector, text).await?)
    }

    async fn press_key(&self, key: &str) -> Result<(), PageError> {
        Ok(self.session.press_key(key).await?)
    }

    async fn scroll(&self, dx: f64, dy: f64) -> Result<(), PageError> {
        Ok(self.session.scroll(dx, dy).await?)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, PageError> {
        Ok(self.session.evaluate(expression).await?)
    }

    async fn inner_text(&self, selector: Option<&str>) -> Result<String, PageError> {
        Ok(self.session.inner_text(selector).await?)
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, PageError> {
        let b64 = self.session.screenshot(full_page).await?;
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| PageError::Backend(format!("invalid screenshot payload: {}", e)))
    }

    async fn url(&self) -> Result<String, PageError> {
        Ok(self.session.url().await?)
    }

    async fn title(&self) -> Result<String, PageError> {
        Ok(self.session.title().await?)
    }

    async fn selector_visible(&self, selector: &str) -> Result<bool, PageError> {
        Ok(self.session.selector_visible(selector).await?)
    }

    async fn ready_state(&self) -> Result<String, PageError> {
        Ok(self.session.ready_state().await?)
    }
}

// ============================================================================
// Bridge-backed page
// ============================================================================

/// Page handle over a Playwright page behind the Node.js bridge.
pub struct BridgePage {
    bridge: Arc<PlaywrightBridge>,
    page_id: String,
}

impl BridgePage {
    pub fn new(bridge: Arc<PlaywrightBridge>, page_id: String) -> Self {
        Self { bridge, page_id }
    }
}

#[async_trait]
impl PageHandle for BridgePage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        Ok(self.bridge.navigate(&self.page_id, url, None).await?)
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        Ok(self.bridge.click_selector(&self.page_id, selector).await?)
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), PageError> {
        Ok(self.bridge.fill(&self.page_id, selector, text).await?)
    }

    async fn press_key(&self, key: &str) -> Result<(), PageError> {
        Ok(self.bridge.press_key(&self.page_id, key).await?)
    }

    async fn scroll(&self, dx: f64, dy: f64) -> Result<(), PageError> {
        Ok(self.bridge.scroll(&self.page_id, dx, dy).await?)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, PageError> {
        Ok(self.bridge.evaluate(&self.page_id, expression).await?)
    }

    async fn inner_text(&self, selector: Option<&str>) -> Result<String, PageError> {
        Ok(self.bridge.inner_text(&self.page_id, selector).await?)
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, PageError> {
        let b64 = self.bridge.screenshot(&self.page_id, full_page).await?;
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| PageError::Backend(format!("invalid screenshot payload: {}", e)))
    }

    async fn url(&self) -> Result<String, PageError> {
        Ok(self.bridge.page_url(&self.page_id).await?)
    }

    async fn title(&self) -> Result<String, PageError> {
        Ok(self.bridge.page_title(&self.page_id).await?)
    }

    async fn selector_visible(&self, selector: &str) -> Result<bool, PageError> {
        Ok(self.bridge.is_visible(&self.page_id, selector).await?)
    }

    async fn ready_state(&self) -> Result<String, PageError> {
        let value = self.bridge.evaluate(&self.page_id, "document.readyState").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn native_waits(&self) -> Option<&dyn NativeWaits> {
        Some(self)
    }
}

#[async_trait]
impl NativeWaits for BridgePage {
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), PageError> {
        Ok(self
            .bridge
            .wait_for_selector(&self.page_id, selector, timeout_ms)
            .await?)
    }

    async fn wait_for_url_glob(&self, glob: &str, timeout_ms: u64) -> Result<(), PageError> {
        Ok(self
            .bridge
            .wait_for_url(&self.page_id, glob, timeout_ms)
            .await?)
    }

    async fn wait_for_load_state(
        &self,
        state: LoadState,
        timeout_ms: u64,
    ) -> Result<(), PageError> {
        Ok(self
            .bridge
            .wait_for_load_state(&self.page_id, state.as_str(), timeout_ms)
            .await?)
    }

    async fn wait_for_predicate(
        &self,
        expression: &str,
        timeout_ms: u64,
    ) -> Result<(), PageError> {
        Ok(self
            .bridge
            .wait_for_function(&self.page_id, expression, timeout_ms)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_error_from_cdp() {
        let err: PageError = CdpError::ElementNotFound("#x".to_string()).into();
        assert!(matches!(err, PageError::ElementNotFound(_)));

        let err: PageError = CdpError::SessionClosed.into();
        assert!(matches!(err, PageError::Backend(_)));
    }

    #[test]
    fn test_page_error_into_action_error() {
        let err: ActionError = PageError::ElementNotFound("#x".to_string()).into();
        assert!(matches!(err, ActionError::ElementNotFound(_)));
    }
}
