//! Typed RPC wrappers for PlaywrightBridge.
//!
//! Cross-file impl block keeping the wire plumbing in `bridge.rs` and the
//! browser surface here.

use serde_json::json;

use super::bridge::PlaywrightBridge;
use super::error::BridgeError;

/// Result of launching a persistent context: the context plus its first page.
#[derive(Debug, Clone)]
pub struct PersistentContext {
    pub context_id: String,
    pub page_id: String,
}

impl PlaywrightBridge {
    // ========================================================================
    // Context lifecycle
    // ========================================================================

    /// Launch a managed persistent browsing context over `user_data_dir`.
    ///
    /// The launcher applies Playwright's own argument set; extension launch
    /// args are deliberately not injected here (process-spawn strategies
    /// handle those).
    pub async fn launch_persistent_context(
        &self,
        user_data_dir: &str,
        headless: bool,
        executable_path: Option<&str>,
    ) -> Result<PersistentContext, BridgeError> {
        let result = self
            .call(
                "launchPersistentContext",
                json!({
                    "userDataDir": user_data_dir,
                    "headless": headless,
                    "executablePath": executable_path,
                }),
            )
            .await?;

        let context_id = result["contextId"]
            .as_str()
            .ok_or_else(|| BridgeError::Remote("missing contextId".to_string()))?
            .to_string();
        let page_id = result["pageId"]
            .as_str()
            .ok_or_else(|| BridgeError::Remote("missing pageId".to_string()))?
            .to_string();

        Ok(PersistentContext {
            context_id,
            page_id,
        })
    }

    pub async fn close_context(&self, context_id: &str) -> Result<(), BridgeError> {
        self.call("closeContext", json!({"contextId": context_id}))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Page operations
    // ========================================================================

    pub async fn navigate(
        &self,
        page_id: &str,
        url: &str,
        wait_until: Option<&str>,
    ) -> Result<(), BridgeError> {
        self.call(
            "navigate",
            json!({
                "pageId": page_id,
                "url": url,
                "waitUntil": wait_until.unwrap_or("domcontentloaded"),
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn click_selector(&self, page_id: &str, selector: &str) -> Result<(), BridgeError> {
        self.call(
            "clickSelector",
            json!({"pageId": page_id, "selector": selector}),
        )
        .await?;
        Ok(())
    }

    pub async fn fill(
        &self,
        page_id: &str,
        selector: &str,
        value: &str,
    ) -> Result<(), BridgeError> {
        self.call(
            "fill",
            json!({"pageId": page_id, "selector": selector, "value": value}),
        )
        .await?;
        Ok(())
    }

    pub async fn press_key(&self, page_id: &str, key: &str) -> Result<(), BridgeError> {
        self.call("pressKey", json!({"pageId": page_id, "key": key}))
            .await?;
        Ok(())
    }

    pub async fn scroll(&self, page_id: &str, dx: f64, dy: f64) -> Result<(), BridgeError> {
        self.call("scroll", json!({"pageId": page_id, "dx": dx, "dy": dy}))
            .await?;
        Ok(())
    }

    pub async fn evaluate(
        &self,
        page_id: &str,
        expression: &str,
    ) -> Result<serde_json::Value, BridgeError> {
        self.call(
            "evaluate",
            json!({"pageId": page_id, "expression": expression}),
        )
        .await
    }

    pub async fn inner_text(
        &self,
        page_id: &str,
        selector: Option<&str>,
    ) -> Result<String, BridgeError> {
        let result = self
            .call(
                "innerText",
                json!({"pageId": page_id, "selector": selector}),
            )
            .await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    pub async fn screenshot(&self, page_id: &str, full_page: bool) -> Result<String, BridgeError> {
        let result = self
            .call(
                "screenshot",
                json!({"pageId": page_id, "fullPage": full_page}),
            )
            .await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| BridgeError::Remote("missing screenshot data".to_string()))
    }

    pub async fn page_url(&self, page_id: &str) -> Result<String, BridgeError> {
        let result = self.call("url", json!({"pageId": page_id})).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    pub async fn page_title(&self, page_id: &str) -> Result<String, BridgeError> {
        let result = self.call("title", json!({"pageId": page_id})).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    pub async fn is_visible(&self, page_id: &str, selector: &str) -> Result<bool, BridgeError> {
        let result = self
            .call(
                "isVisible",
                json!({"pageId": page_id, "selector": selector}),
            )
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    // ========================================================================
    // Native waits
    // ========================================================================

    pub async fn wait_for_selector(
        &self,
        page_id: &str,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<(), BridgeError> {
        self.call(
            "waitForSelector",
            json!({"pageId": page_id, "selector": selector, "timeout": timeout_ms}),
        )
        .await?;
        Ok(())
    }

    pub async fn wait_for_url(
        &self,
        page_id: &str,
        glob: &str,
        timeout_ms: u64,
    ) -> Result<(), BridgeError> {
        self.call(
            "waitForUrl",
            json!({"pageId": page_id, "glob": glob, "timeout": timeout_ms}),
        )
        .await?;
        Ok(())
    }

    pub async fn wait_for_load_state(
        &self,
        page_id: &str,
        state: &str,
        timeout_ms: u64,
    ) -> Result<(), BridgeError> {
        self.call(
            "waitForLoadState",
            json!({"pageId": page_id, "state": state, "timeout": timeout_ms}),
        )
        .await?;
        Ok(())
    }

    pub async fn wait_for_function(
        &self,
        page_id: &str,
        expression: &str,
        timeout_ms: u64,
    ) -> Result<(), BridgeError> {
        self.call(
            "waitForFunction",
            json!({"pageId": page_id, "expression": expression, "timeout": timeout_ms}),
        )
        .await?;
        Ok(())
    }
}
