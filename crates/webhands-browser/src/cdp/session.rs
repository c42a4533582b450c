//! CDP page session: primitives against a single attached target.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::SinkExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use webhands_protocols::cdp::{CdpCommand, CdpEnvelope};

use super::client::{PendingRequest, WsSink};
use super::error::CdpError;

/// A control channel to one page target.
pub struct PageSession {
    target_id: String,
    session_id: String,
    ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    request_id: Arc<AtomicU64>,
    #[allow(dead_code)]
    event_rx: mpsc::UnboundedReceiver<CdpEnvelope>,
}

impl PageSession {
    pub(crate) fn new(
        target_id: String,
        session_id: String,
        ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
        pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
        request_id: Arc<AtomicU64>,
        event_rx: mpsc::UnboundedReceiver<CdpEnvelope>,
    ) -> Self {
        Self {
            target_id,
            session_id,
            ws_tx,
            pending,
            request_id,
            event_rx,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send a session-scoped CDP command and wait for the response.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let command = CdpCommand {
            id,
            method: method.to_string(),
            params,
            session_id: Some(self.session_id.clone()),
        };

        let json = serde_json::to_string(&command)?;
        trace!("CDP session send: {}", json);

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.pending.lock().insert(id, PendingRequest { tx });

        {
            let mut ws = self.ws_tx.lock().await;
            ws.send(Message::Text(json.into())).await?;
        }

        match tokio::time::timeout(std::time::Duration::from_secs(30), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::SessionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CdpError::Timeout(format!("Request {} timed out", method)))
            }
        }
    }

    pub(crate) async fn enable_domains(&self) -> Result<(), CdpError> {
        self.call("Page.enable", None).await?;
        self.call("Runtime.enable", None).await?;
        self.call("DOM.enable", None).await?;
        debug!(session = %self.session_id, "enabled CDP domains");
        Ok(())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub async fn navigate(&self, url: &str) -> Result<(), CdpError> {
        let result = self
            .call("Page.navigate", Some(json!({"url": url})))
            .await?;

        if let Some(error) = result.get("errorText").and_then(|e| e.as_str()) {
            if !error.is_empty() {
                return Err(CdpError::NavigationFailed(error.to_string()));
            }
        }

        self.wait_for_ready().await?;
        debug!(url = %url, "navigated");
        Ok(())
    }

    /// Poll `document.readyState` until the document is usable.
    async fn wait_for_ready(&self) -> Result<(), CdpError> {
        let start = std::time::Instant::now();
        let timeout = std::time::Duration::from_secs(30);

        loop {
            let state = self.ready_state().await?;
            if state == "complete" || state == "interactive" {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(CdpError::Timeout("page load timeout".to_string()));
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    pub async fn ready_state(&self) -> Result<String, CdpError> {
        let value = self.evaluate("document.readyState").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn url(&self) -> Result<String, CdpError> {
        let value = self.evaluate("window.location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn title(&self) -> Result<String, CdpError> {
        let value = self.evaluate("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    // ========================================================================
    // Script evaluation
    // ========================================================================

    /// Evaluate an expression, returning its JSON value.
    ///
    /// Values that cannot cross the JSON boundary (functions, DOM nodes,
    /// undefined) degrade to the remote object's string description rather
    /// than failing.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| exception.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or("unknown error");
            return Err(CdpError::JavaScript(text.to_string()));
        }

        let remote = &result["result"];
        if let Some(value) = remote.get("value") {
            return Ok(value.clone());
        }
        if let Some(description) = remote.get("description").and_then(|d| d.as_str()) {
            return Ok(Value::String(description.to_string()));
        }
        if remote.get("type").and_then(|t| t.as_str()) == Some("undefined") {
            return Ok(Value::Null);
        }
        Ok(Value::Null)
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Click the element matched by `selector` at its content-box center.
    pub async fn click_selector(&self, selector: &str) -> Result<(), CdpError> {
        let (x, y) = self.element_center(selector).await?;
        self.click(x, y).await
    }

    pub async fn click(&self, x: f64, y: f64) -> Result<(), CdpError> {
        for event_type in ["mousePressed", "mouseReleased"] {
            self.call(
                "Input.dispatchMouseEvent",
                Some(json!({
                    "type": event_type,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "clickCount": 1,
                })),
            )
            .await?;
        }
        debug!(x, y, "clicked");
        Ok(())
    }

    /// Focus `selector`, replace its value with `text`.
    pub async fn fill(&self, selector: &str, text: &str) -> Result<(), CdpError> {
        let node_id = self
            .query_selector(selector)
            .await?
            .ok_or_else(|| CdpError::ElementNotFound(selector.to_string()))?;
        self.call("DOM.focus", Some(json!({"nodeId": node_id})))
            .await?;

        // Select-all then overtype, so stale values never prefix the input.
        self.press_key_with_modifiers("a", 2).await?;
        self.call("Input.insertText", Some(json!({"text": text})))
            .await?;
        debug!(selector = %selector, chars = text.len(), "filled input");
        Ok(())
    }

    pub async fn press_key(&self, key: &str) -> Result<(), CdpError> {
        self.press_key_with_modifiers(key, 0).await
    }

    async fn press_key_with_modifiers(&self, key: &str, modifiers: i32) -> Result<(), CdpError> {
        for event_type in ["keyDown", "keyUp"] {
            let mut params = json!({
                "type": event_type,
                "key": key,
            });
            if modifiers != 0 {
                params["modifiers"] = json!(modifiers);
            }
            if key == "Enter" && event_type == "keyDown" {
                params["text"] = json!("\r");
            }
            self.call("Input.dispatchKeyEvent", Some(params)).await?;
        }
        Ok(())
    }

    /// Scroll by wheel delta at the viewport center.
    pub async fn scroll(&self, dx: f64, dy: f64) -> Result<(), CdpError> {
        self.call(
            "Input.dispatchMouseEvent",
            Some(json!({
                "type": "mouseWheel",
                "x": 640.0,
                "y": 360.0,
                "deltaX": dx,
                "deltaY": dy,
            })),
        )
        .await?;
        Ok(())
    }

    // ========================================================================
    // DOM queries
    // ========================================================================

    pub async fn query_selector(&self, selector: &str) -> Result<Option<i64>, CdpError> {
        let doc = self.call("DOM.getDocument", Some(json!({"depth": 0}))).await?;
        let root_id = doc["root"]["nodeId"]
            .as_i64()
            .ok_or_else(|| CdpError::InvalidResponse("missing document root".to_string()))?;

        let result = self
            .call(
                "DOM.querySelector",
                Some(json!({"nodeId": root_id, "selector": selector})),
            )
            .await?;

        match result["nodeId"].as_i64() {
            Some(0) | None => Ok(None),
            Some(id) => Ok(Some(id)),
        }
    }

    /// Whether `selector` matches a visible element (non-empty box).
    pub async fn selector_visible(&self, selector: &str) -> Result<bool, CdpError> {
        let script = format!(
            "(function() {{
                const el = document.querySelector({});
                if (!el) return false;
                const r = el.getBoundingClientRect();
                return r.width > 0 && r.height > 0;
            }})()",
            serde_json::to_string(selector)?
        );
        let value = self.evaluate(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Inner text of `selector`, or of the whole body when `None`.
    pub async fn inner_text(&self, selector: Option<&str>) -> Result<String, CdpError> {
        let script = match selector {
            Some(sel) => format!(
                "document.querySelector({})?.innerText ?? ''",
                serde_json::to_string(sel)?
            ),
            None => "document.body ? document.body.innerText : ''".to_string(),
        };
        let value = self.evaluate(&script).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn element_center(&self, selector: &str) -> Result<(f64, f64), CdpError> {
        let node_id = self
            .query_selector(selector)
            .await?
            .ok_or_else(|| CdpError::ElementNotFound(selector.to_string()))?;

        let result = self
            .call("DOM.getBoxModel", Some(json!({"nodeId": node_id})))
            .await
            .map_err(|_| {
                CdpError::ElementNotFound(format!("{} (not visible)", selector))
            })?;

        let quad: Vec<f64> =
            serde_json::from_value(result["model"]["content"].clone()).unwrap_or_default();
        Ok(Self::quad_center(&quad))
    }

    fn quad_center(quad: &[f64]) -> (f64, f64) {
        if quad.len() >= 8 {
            let x = (quad[0] + quad[2] + quad[4] + quad[6]) / 4.0;
            let y = (quad[1] + quad[3] + quad[5] + quad[7]) / 4.0;
            (x, y)
        } else {
            (0.0, 0.0)
        }
    }

    // ========================================================================
    // Screenshot
    // ========================================================================

    /// Capture a screenshot, returning base64 PNG data.
    pub async fn screenshot(&self, full_page: bool) -> Result<String, CdpError> {
        let mut params = json!({"format": "png"});
        if full_page {
            params["captureBeyondViewport"] = json!(true);
        }
        let result = self
            .call("Page.captureScreenshot", Some(params))
            .await?;
        result["data"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CdpError::InvalidResponse("missing screenshot data".to_string()))
    }
}
