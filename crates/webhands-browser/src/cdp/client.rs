//! CDP WebSocket client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};

use webhands_protocols::cdp::{BrowserVersion, CdpCommand, CdpEnvelope, TargetInfo};

use super::error::CdpError;
use super::session::PageSession;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Pending request waiting for its response.
pub(crate) struct PendingRequest {
    pub tx: oneshot::Sender<Result<Value, CdpError>>,
}

/// CDP client bound to one debugging connection.
///
/// The same client drives a locally spawned browser, a reused endpoint from a
/// prior run, or the relay - all three speak the same wire protocol.
pub struct CdpClient {
    /// Browser WebSocket URL this client is attached to.
    ws_url: String,
    ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    request_id: Arc<AtomicU64>,
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    /// Event subscribers keyed by session id.
    event_handlers: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<CdpEnvelope>>>>,
    _recv_task: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect via an HTTP debugging endpoint (e.g. `http://127.0.0.1:33521`).
    ///
    /// Fetches `/json/version` to discover the WebSocket URL, then attaches.
    pub async fn connect_http(endpoint: &str) -> Result<Self, CdpError> {
        let endpoint = endpoint.trim_end_matches('/');
        let version_url = format!("{}/json/version", endpoint);
        debug!(url = %version_url, "fetching browser version descriptor");

        let version: BrowserVersion = reqwest::get(&version_url)
            .await
            .map_err(|e| CdpError::EndpointUnreachable(format!("{}: {}", endpoint, e)))?
            .json()
            .await
            .map_err(|e| CdpError::EndpointUnreachable(format!("{}: {}", endpoint, e)))?;

        debug!(browser = %version.browser, "discovered browser");
        Self::connect_ws(&version.web_socket_debugger_url).await
    }

    /// Connect directly to a browser-level WebSocket debugger URL.
    pub async fn connect_ws(ws_url: &str) -> Result<Self, CdpError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| CdpError::ConnectionFailed(format!("{}: {}", ws_url, e)))?;

        let (ws_sink, ws_source) = ws_stream.split();
        let ws_tx = Arc::new(tokio::sync::Mutex::new(ws_sink));
        let pending: Arc<Mutex<HashMap<u64, PendingRequest>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let event_handlers: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<CdpEnvelope>>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let recv_task = {
            let pending = pending.clone();
            let event_handlers = event_handlers.clone();
            tokio::spawn(async move {
                Self::receive_loop(ws_source, pending, event_handlers).await;
            })
        };

        debug!(url = %ws_url, "CDP client connected");

        Ok(Self {
            ws_url: ws_url.to_string(),
            ws_tx,
            request_id: Arc::new(AtomicU64::new(1)),
            pending,
            event_handlers,
            _recv_task: recv_task,
        })
    }

    async fn receive_loop(
        mut ws_source: WsSource,
        pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
        event_handlers: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<CdpEnvelope>>>>,
    ) {
        while let Some(msg) = ws_source.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    trace!("CDP recv: {}", text);
                    match serde_json::from_str::<CdpEnvelope>(&text) {
                        Ok(envelope) => {
                            if let Some(id) = envelope.id {
                                let pending_req = pending.lock().remove(&id);
                                if let Some(req) = pending_req {
                                    let result = if let Some(err) = envelope.error {
                                        Err(CdpError::Protocol {
                                            code: err.code,
                                            message: err.message,
                                        })
                                    } else {
                                        Ok(envelope.result.unwrap_or(Value::Null))
                                    };
                                    let _ = req.tx.send(result);
                                }
                            } else if envelope.method.is_some() {
                                let session_id =
                                    envelope.session_id.clone().unwrap_or_default();
                                let handlers = event_handlers.read().await;
                                if let Some(tx) = handlers.get(&session_id) {
                                    let _ = tx.send(envelope);
                                }
                            }
                        }
                        Err(e) => warn!("failed to parse CDP message: {}", e),
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("CDP WebSocket closed");
                    break;
                }
                Err(e) => {
                    error!("CDP WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        // Fail anything still waiting so callers see a closed session, not a
        // 30s timeout.
        let mut pending = pending.lock();
        for (_, req) in pending.drain() {
            let _ = req.tx.send(Err(CdpError::SessionClosed));
        }
    }

    /// Send a browser-level CDP command and wait for its response.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value, CdpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let command = CdpCommand {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(|s| s.to_string()),
        };

        let json = serde_json::to_string(&command)?;
        trace!("CDP send: {}", json);

        let (tx, rx) = oneshot::channel();
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

    /// Browser WebSocket URL this client is attached to.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// List all targets exposed by the connection.
    pub async fn get_targets(&self) -> Result<Vec<TargetInfo>, CdpError> {
        let result = self.call("Target.getTargets", None, None).await?;
        let targets: Vec<TargetInfo> = serde_json::from_value(result["targetInfos"].clone())?;
        Ok(targets)
    }

    /// Pick the target to drive.
    ///
    /// Debugging connections can surface hidden or background targets first,
    /// so prefer the most recently created page-type target; with no page
    /// targets fall back to the newest target of any type. `None` means the
    /// connection exposed no targets at all.
    pub fn select_target(targets: &[TargetInfo]) -> Option<&TargetInfo> {
        targets
            .iter()
            .rev()
            .find(|t| t.target_type == "page" && !t.url.starts_with("devtools://"))
            .or_else(|| targets.last())
    }

    /// Attach to a target, producing a page session.
    pub async fn attach_page(&self, target_id: &str) -> Result<PageSession, CdpError> {
        let result = self
            .call(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true
                })),
                None,
            )
            .await?;

        let session_id = result["sessionId"]
            .as_str()
            .ok_or_else(|| CdpError::InvalidResponse("missing sessionId".to_string()))?
            .to_string();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.event_handlers
            .write()
            .await
            .insert(session_id.clone(), event_tx);

        let session = PageSession::new(
            target_id.to_string(),
            session_id,
            self.ws_tx.clone(),
            self.pending.clone(),
            self.request_id.clone(),
            event_rx,
        );

        session.enable_domains().await?;
        Ok(session)
    }

    /// Open a new blank page target.
    pub async fn create_page(&self, url: Option<&str>) -> Result<String, CdpError> {
        let result = self
            .call(
                "Target.createTarget",
                Some(json!({"url": url.unwrap_or("about:blank")})),
                None,
            )
            .await?;
        result["targetId"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CdpError::InvalidResponse("missing targetId".to_string()))
    }

    /// Disconnect, aborting the receive loop.
    pub async fn close(&self) {
        let mut ws = self.ws_tx.lock().await;
        let _ = ws.send(Message::Close(None)).await;
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self._recv_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, target_type: &str, url: &str) -> TargetInfo {
        TargetInfo {
            target_id: id.to_string(),
            target_type: target_type.to_string(),
            title: String::new(),
            url: url.to_string(),
            attached: None,
            browser_context_id: None,
        }
    }

    #[test]
    fn test_select_target_prefers_newest_page() {
        let targets = vec![
            target("t1", "page", "https://old.example.com"),
            target("t2", "service_worker", "https://example.com/sw.js"),
            target("t3", "page", "https://new.example.com"),
        ];
        let selected = CdpClient::select_target(&targets).unwrap();
        assert_eq!(selected.target_id, "t3");
    }

    #[test]
    fn test_select_target_skips_devtools_pages() {
        let targets = vec![
            target("t1", "page", "https://example.com"),
            target("t2", "page", "devtools://devtools/bundled/inspector.html"),
        ];
        let selected = CdpClient::select_target(&targets).unwrap();
        assert_eq!(selected.target_id, "t1");
    }

    #[test]
    fn test_select_target_falls_back_to_newest() {
        let targets = vec![
            target("t1", "background_page", "chrome-extension://x"),
            target("t2", "service_worker", "https://example.com/sw.js"),
        ];
        let selected = CdpClient::select_target(&targets).unwrap();
        assert_eq!(selected.target_id, "t2");
    }

    #[test]
    fn test_select_target_empty() {
        assert!(CdpClient::select_target(&[]).is_none());
    }
}
