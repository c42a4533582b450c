//! Browser transport configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::extensions::default_extensions_root;
use crate::profile::default_profiles_root;

/// Relay endpoint settings, present only when a relay is enabled.
#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    pub host: String,
    pub port: u16,
    pub token: Option<String>,
}

impl RelayEndpoint {
    /// Discovery URL serving the version descriptor.
    pub fn discovery_url(&self) -> String {
        format!("http://{}:{}/json/version", self.host, self.port)
    }

    /// Fallback client WebSocket URL used when discovery fails.
    pub fn default_ws_url(&self) -> String {
        let base = format!("ws://{}:{}/cdp", self.host, self.port);
        match &self.token {
            Some(token) => format!("{}?token={}", base, token),
            None => base,
        }
    }
}

/// Configuration consumed by the transport negotiator and action engine.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Explicit browser executable; discovery applies when `None`.
    pub executable_path: Option<PathBuf>,
    /// Root directory for named persistent profiles.
    pub profiles_root: PathBuf,
    /// Root directory for unpacked extensions.
    pub extensions_root: PathBuf,
    /// Explicit id -> directory overrides for extensions.
    pub extension_paths: HashMap<String, PathBuf>,
    /// Extension ids injected into process-spawn launches.
    pub extensions: Vec<String>,
    /// Try the managed persistent-context launch first.
    pub prefer_persistent_context: bool,
    /// Default headless mode; requests may override.
    pub headless: bool,
    /// Screenshots and other outputs must stay under this root.
    pub workspace_root: PathBuf,
    /// Endpoint discovery deadline for fresh launches.
    pub launch_timeout_ms: u64,
    /// Relay endpoint; `None` disables the relay strategy entirely.
    pub relay: Option<RelayEndpoint>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            profiles_root: default_profiles_root(),
            extensions_root: default_extensions_root(),
            extension_paths: HashMap::new(),
            extensions: Vec::new(),
            prefer_persistent_context: true,
            headless: true,
            workspace_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            launch_timeout_ms: 20_000,
            relay: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrowserConfig::default();
        assert!(config.prefer_persistent_context);
        assert!(config.headless);
        assert!(config.relay.is_none());
        assert_eq!(config.launch_timeout_ms, 20_000);
    }

    #[test]
    fn test_relay_endpoint_urls() {
        let relay = RelayEndpoint {
            host: "127.0.0.1".to_string(),
            port: 18792,
            token: None,
        };
        assert_eq!(relay.discovery_url(), "http://127.0.0.1:18792/json/version");
        assert_eq!(relay.default_ws_url(), "ws://127.0.0.1:18792/cdp");
    }

    #[test]
    fn test_relay_ws_url_carries_token() {
        let relay = RelayEndpoint {
            host: "127.0.0.1".to_string(),
            port: 18792,
            token: Some("secret".to_string()),
        };
        assert_eq!(
            relay.default_ws_url(),
            "ws://127.0.0.1:18792/cdp?token=secret"
        );
    }
}
