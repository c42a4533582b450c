//! Configuration loading: TOML file plus environment overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use webhands_browser::{BrowserConfig, RelayEndpoint};
use webhands_relay::RelayConfig;

/// Environment override for preferring managed persistent launches.
pub const PREFER_PERSISTENT_ENV: &str = "WEBHANDS_PREFER_PERSISTENT_CONTEXT";

/// Environment overrides for relay settings.
pub const RELAY_HOST_ENV: &str = "WEBHANDS_RELAY_HOST";
pub const RELAY_PORT_ENV: &str = "WEBHANDS_RELAY_PORT";
pub const RELAY_TOKEN_ENV: &str = "WEBHANDS_RELAY_TOKEN";

/// Top-level configuration file shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebHandsConfig {
    pub browser: BrowserSection,
    pub relay: RelaySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub executable_path: Option<PathBuf>,
    pub profiles_root: Option<PathBuf>,
    pub extensions_root: Option<PathBuf>,
    pub extension_paths: HashMap<String, PathBuf>,
    pub extensions: Vec<String>,
    pub prefer_persistent_context: bool,
    pub headless: bool,
    pub workspace_root: Option<PathBuf>,
    pub launch_timeout_ms: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            profiles_root: None,
            extensions_root: None,
            extension_paths: HashMap::new(),
            extensions: Vec::new(),
            prefer_persistent_context: true,
            headless: true,
            workspace_root: None,
            launch_timeout_ms: 20_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    /// The relay strategy is never used unless this is set.
    pub enabled: bool,
    #[serde(flatten)]
    pub config: RelayConfig,
}

impl WebHandsConfig {
    /// Load from a TOML file; a missing file yields defaults. Environment
    /// overrides apply either way.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let mut config = Self::default();
            config.apply_env();
            return Ok(config);
        }
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = toml::from_str(&body)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(PREFER_PERSISTENT_ENV) {
            self.browser.prefer_persistent_context =
                matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Ok(host) = std::env::var(RELAY_HOST_ENV) {
            self.relay.config.host = host;
            self.relay.enabled = true;
        }
        if let Ok(port) = std::env::var(RELAY_PORT_ENV) {
            if let Ok(port) = port.parse() {
                self.relay.config.port = port;
                self.relay.enabled = true;
            }
        }
        if let Ok(token) = std::env::var(RELAY_TOKEN_ENV) {
            self.relay.config.token = Some(token);
        }
    }

    /// Materialize the browser transport configuration.
    pub fn browser_config(&self) -> BrowserConfig {
        let defaults = BrowserConfig::default();
        BrowserConfig {
            executable_path: self.browser.executable_path.clone(),
            profiles_root: self
                .browser
                .profiles_root
                .clone()
                .unwrap_or(defaults.profiles_root),
            extensions_root: self
                .browser
                .extensions_root
                .clone()
                .unwrap_or(defaults.extensions_root),
            extension_paths: self.browser.extension_paths.clone(),
            extensions: self.browser.extensions.clone(),
            prefer_persistent_context: self.browser.prefer_persistent_context,
            headless: self.browser.headless,
            workspace_root: self
                .browser
                .workspace_root
                .clone()
                .unwrap_or(defaults.workspace_root),
            launch_timeout_ms: self.browser.launch_timeout_ms,
            relay: self.relay_endpoint(),
        }
    }

    /// The relay endpoint for the negotiator, when enabled.
    pub fn relay_endpoint(&self) -> Option<RelayEndpoint> {
        if !self.relay.enabled {
            return None;
        }
        Some(RelayEndpoint {
            host: self.relay.config.host.clone(),
            port: self.relay.config.port,
            token: self.relay.config.token.clone(),
        })
    }
}
