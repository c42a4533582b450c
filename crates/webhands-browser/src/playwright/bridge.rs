//! Bridge process lifecycle and JSON-RPC plumbing.
//!
//! A Node.js child process runs the embedded Playwright script; requests and
//! responses are line-delimited JSON over stdin/stdout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::error::BridgeError;

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct PlaywrightBridgeConfig {
    /// Explicit Node.js executable; discovered on PATH when `None`.
    pub node_path: Option<PathBuf>,
    /// Timeout for bridge responses in milliseconds.
    pub response_timeout_ms: u64,
}

impl Default for PlaywrightBridgeConfig {
    fn default() -> Self {
        Self {
            node_path: None,
            response_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Serialize)]
struct BridgeRequest {
    id: u64,
    method: String,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<BridgeErrorResponse>,
}

#[derive(Debug, Deserialize)]
struct BridgeErrorResponse {
    message: String,
}

type PendingRequests = HashMap<u64, oneshot::Sender<Result<serde_json::Value, BridgeError>>>;

/// Node.js Playwright bridge.
pub struct PlaywrightBridge {
    config: PlaywrightBridgeConfig,
    process: Mutex<Option<Child>>,
    stdin: Mutex<Option<tokio::process::ChildStdin>>,
    request_id: AtomicU64,
    pending: Arc<RwLock<PendingRequests>>,
}

impl PlaywrightBridge {
    pub fn new(config: PlaywrightBridgeConfig) -> Self {
        Self {
            config,
            process: Mutex::new(None),
            stdin: Mutex::new(None),
            request_id: AtomicU64::new(1),
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start the bridge process and wait for its ping.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let node_path = self.find_node()?;

        let script_path = std::env::temp_dir().join("webhands_playwright_bridge.js");
        tokio::fs::write(&script_path, include_str!("bridge_script.js"))
            .await
            .map_err(|e| BridgeError::StartFailed(format!("failed to write bridge script: {}", e)))?;

        info!(script = %script_path.display(), "starting Playwright bridge");

        let mut child = Command::new(&node_path)
            .arg(&script_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::StartFailed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::StartFailed("failed to get stdin".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("[playwright bridge] {}", line);
                }
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::StartFailed("failed to get stdout".to_string()))?;

        let pending = self.pending.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<BridgeResponse>(&line) {
                    Ok(response) => {
                        let mut pending = pending.write().await;
                        if let Some(sender) = pending.remove(&response.id) {
                            let result = if let Some(err) = response.error {
                                Err(BridgeError::Remote(err.message))
                            } else {
                                Ok(response.result.unwrap_or(serde_json::Value::Null))
                            };
                            let _ = sender.send(result);
                        }
                    }
                    Err(e) => error!("failed to parse bridge response: {} - {}", e, line),
                }
            }
        });

        *self.process.lock().await = Some(child);
        *self.stdin.lock().await = Some(stdin);

        let ready = self.call("ping", serde_json::json!({})).await?;
        if ready.as_str() != Some("pong") {
            return Err(BridgeError::StartFailed(
                "bridge did not answer ping".to_string(),
            ));
        }

        info!("Playwright bridge started");
        Ok(())
    }

    /// Stop the bridge process.
    pub async fn stop(&self) {
        let _ = self.call("shutdown", serde_json::json!({})).await;
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
        }
        debug!("Playwright bridge stopped");
    }

    /// Whether the bridge process has been started.
    pub async fn is_running(&self) -> bool {
        self.process.lock().await.is_some()
    }

    /// Call a bridge method.
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = BridgeRequest {
            id,
            method: method.to_string(),
            params,
        };
        let request_json = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(id, tx);

        {
            let mut stdin_guard = self.stdin.lock().await;
            let stdin = stdin_guard.as_mut().ok_or(BridgeError::NotStarted)?;
            stdin.write_all(request_json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
        }

        let timeout = tokio::time::Duration::from_millis(self.config.response_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::Communication(
                "response channel closed".to_string(),
            )),
            Err(_) => {
                self.pending.write().await.remove(&id);
                Err(BridgeError::Timeout(format!(
                    "method {} timed out after {}ms",
                    method, self.config.response_timeout_ms
                )))
            }
        }
    }

    fn find_node(&self) -> Result<PathBuf, BridgeError> {
        if let Some(ref path) = self.config.node_path {
            return Ok(path.clone());
        }

        let candidates = [
            "node",
            "/usr/local/bin/node",
            "/usr/bin/node",
            "/opt/homebrew/bin/node",
        ];
        for candidate in candidates {
            if which::which(candidate).is_ok() {
                return Ok(PathBuf::from(candidate));
            }
        }

        Err(BridgeError::NodeNotFound)
    }
}
