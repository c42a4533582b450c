//! # WebHands Relay
//!
//! A standalone WebSocket service that bridges the Chrome DevTools Protocol
//! between one browser-extension peer and any number of protocol clients.
//! Clients drive an extension-held, user-owned tab exactly as if it were a
//! locally spawned browser process.
//!
//! Endpoints:
//! - `GET /health` - liveness probe, plain `ok`
//! - `GET /json/version` - discovery descriptor with the client WebSocket URL
//! - `WS  /extension?token=` - the single extension peer (application-level
//!   `hello` handshake; a new connection evicts the previous one)
//! - `WS  /cdp?token=` - CDP clients
//!
//! The server owns all of its state explicitly - construct a [`RelayServer`]
//! and pass it around; nothing lives in module-level globals.

mod connection;
mod handler;
mod server;
mod sessions;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, info};

use webhands_protocols::RelayError;

pub use connection::{ClientPeer, ExtensionPeer, PeerMessage};
pub use server::create_router;
pub use sessions::SessionMap;

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Bind host; must be loopback.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port; 0 asks the OS for one.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared auth token carried as a `token` query parameter.
    #[serde(default)]
    pub token: Option<String>,
    /// Refuse to start without a configured token.
    #[serde(default)]
    pub require_token: bool,
    /// Inbound frames above this size close the offending socket.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18_792
}

fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            token: None,
            require_token: false,
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl RelayConfig {
    /// Startup precondition checks; all failures here are configuration
    /// errors raised before any socket is bound.
    pub fn validate(&self) -> Result<(), RelayError> {
        if !is_loopback_host(&self.host) {
            return Err(RelayError::Config(format!(
                "relay must bind a loopback host, got '{}'",
                self.host
            )));
        }
        if self.require_token && self.token.as_deref().unwrap_or("").is_empty() {
            return Err(RelayError::Config(
                "auth token required but not configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Token to enforce on sockets, when configured.
    pub fn required_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

fn is_loopback_host(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "localhost" | "::1" | "[::1]")
}

/// Server-wide relay state, owned by one [`RelayServer`].
pub struct RelayState {
    pub config: RelayConfig,
    /// The single extension peer; a newcomer evicts the old one.
    pub extension: RwLock<Option<ExtensionPeer>>,
    /// Connected CDP clients by connection id.
    pub clients: DashMap<String, ClientPeer>,
    /// target ⇄ session bookkeeping fed by extension events.
    pub sessions: parking_lot::Mutex<SessionMap>,
    /// Address actually bound, for the discovery descriptor.
    pub bound_addr: parking_lot::Mutex<Option<SocketAddr>>,
    pub started: AtomicBool,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            extension: RwLock::new(None),
            clients: DashMap::new(),
            sessions: parking_lot::Mutex::new(SessionMap::default()),
            bound_addr: parking_lot::Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Broadcast a frame to every connected client, preserving per-source
    /// arrival order.
    pub async fn broadcast_to_clients(&self, text: &str) {
        // Snapshot senders first; map guards must not be held across sends.
        let senders: Vec<_> = self
            .clients
            .iter()
            .map(|entry| entry.value().tx.clone())
            .collect();
        for tx in senders {
            let _ = tx.send(PeerMessage::Text(text.to_string())).await;
        }
    }

    /// The client WebSocket URL advertised by discovery.
    pub fn client_ws_url(&self) -> String {
        let addr = self.bound_addr.lock();
        match *addr {
            Some(addr) => format!("ws://{}/cdp", addr),
            None => format!("ws://{}:{}/cdp", self.config.host, self.config.port),
        }
    }
}

/// The relay server lifecycle.
pub struct RelayServer {
    state: Arc<RelayState>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            state: Arc::new(RelayState::new(config)),
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn state(&self) -> Arc<RelayState> {
        self.state.clone()
    }

    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::SeqCst)
    }

    /// Validate configuration, bind, and serve. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, RelayError> {
        self.state.config.validate()?;

        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayError::Bind {
                addr: addr.clone(),
                source: e,
            })?;
        let bound = listener.local_addr().map_err(|e| RelayError::Bind {
            addr,
            source: e,
        })?;

        *self.state.bound_addr.lock() = Some(bound);
        self.state.started.store(true, Ordering::SeqCst);

        let router = create_router(self.state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        info!(addr = %bound, "relay started");

        tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!("relay server error: {}", e);
            }
        });

        Ok(bound)
    }

    /// Stop the server and clear all peers and session maps. Nothing
    /// persists across restarts.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }

        if let Some(extension) = self.state.extension.write().await.take() {
            extension.close().await;
        }
        let clients: Vec<_> = self
            .state
            .clients
            .iter()
            .map(|entry| entry.value().tx.clone())
            .collect();
        for tx in clients {
            let _ = tx
                .send(PeerMessage::Close(1000, "relay stopping"))
                .await;
        }
        self.state.clients.clear();
        self.state.sessions.lock().clear();
        self.state.started.store(false, Ordering::SeqCst);
        debug!("relay stopped");
    }
}
