//! Transport negotiator.
//!
//! Produces a controllable page by trying transport strategies in order:
//! a managed persistent-context launch, re-attaching to a recorded debugging
//! endpoint, spawning a fresh process, and finally the relay. An explicit
//! request preference pins a single strategy; the relay is never chosen
//! under `auto` unless it is enabled in configuration.
//!
//! Every resource acquired on the way to a page (profile lock, spawned
//! process, CDP connection, bridge context) goes onto one ordered cleanup
//! stack that is unwound in reverse on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use webhands_protocols::{BrowserRequest, TransportError, TransportKind, TransportPreference};

use crate::cdp::{CdpClient, CdpError, PageSession};
use crate::config::BrowserConfig;
use crate::extensions::resolve_extensions;
use crate::launcher::{self, EndpointRecord, LaunchOptions, SpawnedBrowser};
use crate::lock::ProfileLockManager;
use crate::page::{BridgePage, CdpPage, PageHandle};
use crate::playwright::{PlaywrightBridge, PlaywrightBridgeConfig};
use crate::profile::ProfileSelection;

/// One negotiation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    PersistentContext,
    ReuseEndpoint,
    SpawnProcess,
    Relay,
}

impl Strategy {
    fn name(&self) -> &'static str {
        match self {
            Strategy::PersistentContext => "persistent-context",
            Strategy::ReuseEndpoint => "direct-cdp (reuse)",
            Strategy::SpawnProcess => "direct-cdp",
            Strategy::Relay => "relay-cdp",
        }
    }
}

/// A resource to be released at teardown, in reverse-acquisition order.
enum Resource {
    Profile(ProfileSelection),
    Process(SpawnedBrowser),
    Connection {
        client: Arc<CdpClient>,
        reused: bool,
    },
    BridgeContext {
        bridge: Arc<PlaywrightBridge>,
        context_id: String,
    },
    Bridge(Arc<PlaywrightBridge>),
}

/// Ordered release stack executed on every exit path.
#[derive(Default)]
pub struct CleanupStack {
    items: Vec<Resource>,
}

impl CleanupStack {
    fn push(&mut self, resource: Resource) {
        self.items.push(resource);
    }

    /// Release everything, newest first. Never fails; failures are logged.
    pub async fn run(&mut self) {
        while let Some(resource) = self.items.pop() {
            match resource {
                Resource::BridgeContext { bridge, context_id } => {
                    if let Err(e) = bridge.close_context(&context_id).await {
                        warn!("failed to close browsing context: {}", e);
                    }
                }
                Resource::Bridge(bridge) => bridge.stop().await,
                Resource::Connection { client, reused } => {
                    // A reused session is not owned by this invocation; leave
                    // it untouched beyond dropping our client.
                    if !reused {
                        client.close().await;
                    }
                }
                Resource::Process(mut spawned) => spawned.terminate().await,
                Resource::Profile(mut profile) => profile.teardown(),
            }
        }
    }
}

/// A negotiated transport with its page handle and owned resources.
pub struct TransportSession {
    pub kind: TransportKind,
    pub page: Arc<dyn PageHandle>,
    pub reused_existing: bool,
    pub persistent: bool,
    pub profile_id: Option<String>,
    pub profile_dir: PathBuf,
    cleanup: CleanupStack,
}

impl TransportSession {
    /// Tear down every owned resource in reverse-acquisition order.
    pub async fn close(mut self) {
        self.cleanup.run().await;
    }
}

/// Outcome of one successful strategy attempt.
struct StrategyOutcome {
    kind: TransportKind,
    page: Arc<dyn PageHandle>,
    reused: bool,
    resources: Vec<Resource>,
}

/// Negotiates transports for browser requests.
pub struct TransportNegotiator {
    config: BrowserConfig,
    locks: ProfileLockManager,
}

impl TransportNegotiator {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            locks: ProfileLockManager::new(),
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Resolve a page for `request`, falling back between strategies.
    pub async fn connect(&self, request: &BrowserRequest) -> Result<TransportSession, TransportError> {
        // Extension validation is a configuration concern: fail before any
        // resource is acquired.
        let extension_dirs = resolve_extensions(
            &self.config.extensions,
            &self.config.extension_paths,
            &self.config.extensions_root,
        )?;

        let headless = request.headless.unwrap_or(self.config.headless);

        let profile = match &request.browser_profile {
            Some(id) => {
                ProfileSelection::persistent(&self.locks, &self.config.profiles_root, id)?
            }
            None => ProfileSelection::ephemeral()?,
        };
        let persistent = profile.persistent;
        let profile_id = profile.profile_id.clone();
        let profile_dir = profile.user_data_dir.clone();

        let strategies = plan_strategies(
            request.transport,
            persistent,
            self.config.prefer_persistent_context,
            self.config.relay.is_some(),
        )?;

        let mut cleanup = CleanupStack::default();
        cleanup.push(Resource::Profile(profile));

        let executable_override = request
            .executable_path
            .as_deref()
            .or(self.config.executable_path.as_deref());

        let mut attempted: Vec<&'static str> = Vec::new();
        let mut last_error: Option<TransportError> = None;

        for strategy in strategies {
            attempted.push(strategy.name());
            debug!(strategy = strategy.name(), "trying transport strategy");

            let attempt = match strategy {
                Strategy::PersistentContext => {
                    self.try_persistent_context(&profile_dir, headless, executable_override)
                        .await
                }
                Strategy::ReuseEndpoint => self.try_reuse_endpoint(&profile_dir).await,
                Strategy::SpawnProcess => {
                    self.try_spawn(
                        &profile_dir,
                        persistent,
                        headless,
                        &extension_dirs,
                        executable_override,
                    )
                    .await
                }
                Strategy::Relay => self.try_relay().await,
            };

            match attempt {
                Ok(outcome) => {
                    for resource in outcome.resources {
                        cleanup.push(resource);
                    }
                    info!(
                        transport = %outcome.kind,
                        reused = outcome.reused,
                        "transport negotiated"
                    );
                    return Ok(TransportSession {
                        kind: outcome.kind,
                        page: outcome.page,
                        reused_existing: outcome.reused,
                        persistent,
                        profile_id,
                        profile_dir,
                        cleanup,
                    });
                }
                Err(e @ TransportError::Config(_)) | Err(e @ TransportError::Lock(_)) => {
                    // Configuration and lock failures are fatal, not
                    // fallback material.
                    cleanup.run().await;
                    return Err(e);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), "strategy failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        cleanup.run().await;
        Err(TransportError::Exhausted {
            attempted: attempted.join(", "),
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no strategy was applicable".to_string()),
        })
    }

    // ========================================================================
    // Strategies
    // ========================================================================

    /// Strategy: managed persistent-context launch through the bridge.
    async fn try_persistent_context(
        &self,
        profile_dir: &Path,
        headless: bool,
        executable: Option<&Path>,
    ) -> Result<StrategyOutcome, TransportError> {
        let bridge = Arc::new(PlaywrightBridge::new(PlaywrightBridgeConfig::default()));
        bridge
            .start()
            .await
            .map_err(|e| TransportError::LaunchFailed(e.to_string()))?;

        // Extension dirs are deliberately not injected here; the managed
        // launcher applies its own argument set. See DESIGN.md.
        let launched = match bridge
            .launch_persistent_context(
                &profile_dir.display().to_string(),
                headless,
                executable.map(|p| p.to_str().unwrap_or_default()).filter(|s| !s.is_empty()),
            )
            .await
        {
            Ok(launched) => launched,
            Err(e) => {
                bridge.stop().await;
                return Err(TransportError::LaunchFailed(e.to_string()));
            }
        };

        let page: Arc<dyn PageHandle> =
            Arc::new(BridgePage::new(bridge.clone(), launched.page_id.clone()));

        Ok(StrategyOutcome {
            kind: TransportKind::PersistentContext,
            page,
            reused: false,
            resources: vec![
                Resource::Bridge(bridge.clone()),
                Resource::BridgeContext {
                    bridge,
                    context_id: launched.context_id,
                },
            ],
        })
    }

    /// Strategy: re-attach to a debugging endpoint recorded by a prior run.
    async fn try_reuse_endpoint(
        &self,
        profile_dir: &Path,
    ) -> Result<StrategyOutcome, TransportError> {
        let record = EndpointRecord::read_live(profile_dir).ok_or_else(|| {
            TransportError::AttachFailed("no live recorded endpoint".to_string())
        })?;

        debug!(ws_url = %record.ws_url, "reusing recorded debugging endpoint");

        let client = match CdpClient::connect_ws(&record.ws_url).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                EndpointRecord::remove(profile_dir);
                return Err(TransportError::AttachFailed(e.to_string()));
            }
        };

        let session = match attach_newest_page(&client).await {
            Ok(session) => session,
            Err(e) => {
                EndpointRecord::remove(profile_dir);
                return Err(e);
            }
        };

        let page: Arc<dyn PageHandle> = Arc::new(CdpPage::new(session));
        Ok(StrategyOutcome {
            kind: TransportKind::DirectCdp,
            page,
            reused: true,
            resources: vec![Resource::Connection {
                client,
                reused: true,
            }],
        })
    }

    /// Strategy: spawn a fresh process and attach over its assigned port.
    async fn try_spawn(
        &self,
        profile_dir: &Path,
        persistent: bool,
        headless: bool,
        extension_dirs: &[PathBuf],
        executable_override: Option<&Path>,
    ) -> Result<StrategyOutcome, TransportError> {
        let executable = crate::executable::resolve_executable(executable_override)?;

        let mut spawned = launcher::launch(&LaunchOptions {
            executable,
            user_data_dir: profile_dir.to_path_buf(),
            headless,
            extension_dirs: extension_dirs.to_vec(),
            launch_timeout_ms: self.config.launch_timeout_ms,
        })
        .await?;

        let client = match CdpClient::connect_ws(&spawned.ws_url).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                spawned.terminate().await;
                return Err(TransportError::AttachFailed(e.to_string()));
            }
        };

        let session = match attach_newest_page(&client).await {
            Ok(session) => session,
            Err(e) => {
                client.close().await;
                spawned.terminate().await;
                return Err(e);
            }
        };

        if persistent {
            let record = EndpointRecord::from_spawned(&spawned);
            if let Err(e) = record.write(profile_dir) {
                warn!("failed to write endpoint record: {}", e);
            }
        }

        let page: Arc<dyn PageHandle> = Arc::new(CdpPage::new(session));
        Ok(StrategyOutcome {
            kind: TransportKind::DirectCdp,
            page,
            reused: false,
            resources: vec![
                Resource::Process(spawned),
                Resource::Connection {
                    client,
                    reused: false,
                },
            ],
        })
    }

    /// Strategy: attach as a CDP client against the relay.
    async fn try_relay(&self) -> Result<StrategyOutcome, TransportError> {
        let relay = self.config.relay.as_ref().ok_or_else(|| {
            TransportError::Config("relay transport requested but no relay is configured".to_string())
        })?;

        // Discovery first; fall back to the conventional endpoint URL.
        let ws_url = match fetch_discovery_ws_url(&relay.discovery_url()).await {
            Some(mut url) => {
                if let Some(token) = &relay.token {
                    if !url.contains("token=") {
                        let separator = if url.contains('?') { '&' } else { '?' };
                        url = format!("{}{}token={}", url, separator, token);
                    }
                }
                url
            }
            None => {
                debug!("relay discovery failed, using default endpoint URL");
                relay.default_ws_url()
            }
        };

        let client = CdpClient::connect_ws(&ws_url)
            .await
            .map(Arc::new)
            .map_err(|e| TransportError::AttachFailed(e.to_string()))?;

        let session = attach_newest_page(&client).await?;

        let page: Arc<dyn PageHandle> = Arc::new(CdpPage::new(session));
        Ok(StrategyOutcome {
            kind: TransportKind::RelayCdp,
            page,
            reused: false,
            resources: vec![Resource::Connection {
                client,
                reused: false,
            }],
        })
    }
}

/// Attach to the best target the connection exposes.
async fn attach_newest_page(client: &CdpClient) -> Result<PageSession, TransportError> {
    let targets = client
        .get_targets()
        .await
        .map_err(|e| TransportError::AttachFailed(e.to_string()))?;

    let target = CdpClient::select_target(&targets).ok_or(TransportError::NoContext)?;

    client
        .attach_page(&target.target_id)
        .await
        .map_err(|e| match &e {
            CdpError::Protocol { message, .. } if message.contains("no attached target") => {
                TransportError::NoExtension(message.clone())
            }
            other => TransportError::AttachFailed(other.to_string()),
        })
}

async fn fetch_discovery_ws_url(discovery_url: &str) -> Option<String> {
    let version: webhands_protocols::cdp::BrowserVersion = reqwest::Client::new()
        .get(discovery_url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
        .ok()?
        .json()
        .await
        .ok()?;
    Some(version.web_socket_debugger_url)
}

/// Build the ordered strategy list for a request.
fn plan_strategies(
    preference: TransportPreference,
    persistent: bool,
    prefer_persistent_context: bool,
    relay_enabled: bool,
) -> Result<Vec<Strategy>, TransportError> {
    let plan = match preference {
        TransportPreference::Auto => {
            let mut plan = Vec::new();
            if prefer_persistent_context {
                plan.push(Strategy::PersistentContext);
            }
            if persistent {
                plan.push(Strategy::ReuseEndpoint);
            }
            plan.push(Strategy::SpawnProcess);
            if persistent {
                // One more spawn covers the transient first-launch race.
                plan.push(Strategy::SpawnProcess);
                if !prefer_persistent_context {
                    plan.push(Strategy::PersistentContext);
                }
            }
            if relay_enabled {
                plan.push(Strategy::Relay);
            }
            plan
        }
        TransportPreference::Cdp => {
            if persistent {
                vec![
                    Strategy::ReuseEndpoint,
                    Strategy::SpawnProcess,
                    Strategy::SpawnProcess,
                ]
            } else {
                vec![Strategy::SpawnProcess]
            }
        }
        TransportPreference::Persistent => vec![Strategy::PersistentContext],
        TransportPreference::Relay => {
            if !relay_enabled {
                return Err(TransportError::Config(
                    "relay transport requested but no relay is configured".to_string(),
                ));
            }
            vec![Strategy::Relay]
        }
    };
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_plan_ephemeral_prefers_context() {
        let plan =
            plan_strategies(TransportPreference::Auto, false, true, false).unwrap();
        assert_eq!(
            plan,
            vec![Strategy::PersistentContext, Strategy::SpawnProcess]
        );
    }

    #[test]
    fn test_auto_plan_persistent_includes_reuse_and_retry() {
        let plan = plan_strategies(TransportPreference::Auto, true, true, false).unwrap();
        assert_eq!(
            plan,
            vec![
                Strategy::PersistentContext,
                Strategy::ReuseEndpoint,
                Strategy::SpawnProcess,
                Strategy::SpawnProcess,
            ]
        );
    }

    #[test]
    fn test_auto_plan_without_context_preference_falls_back_to_it() {
        let plan = plan_strategies(TransportPreference::Auto, true, false, false).unwrap();
        assert_eq!(
            plan,
            vec![
                Strategy::ReuseEndpoint,
                Strategy::SpawnProcess,
                Strategy::SpawnProcess,
                Strategy::PersistentContext,
            ]
        );
    }

    #[test]
    fn test_relay_is_last_and_only_when_enabled() {
        let plan = plan_strategies(TransportPreference::Auto, false, true, true).unwrap();
        assert_eq!(plan.last(), Some(&Strategy::Relay));

        let plan = plan_strategies(TransportPreference::Auto, false, true, false).unwrap();
        assert!(!plan.contains(&Strategy::Relay));
    }

    #[test]
    fn test_pinned_preferences_disable_fallback() {
        let plan =
            plan_strategies(TransportPreference::Persistent, true, true, true).unwrap();
        assert_eq!(plan, vec![Strategy::PersistentContext]);

        let plan = plan_strategies(TransportPreference::Cdp, false, true, true).unwrap();
        assert_eq!(plan, vec![Strategy::SpawnProcess]);
    }

    #[test]
    fn test_pinned_relay_requires_configuration() {
        let err = plan_strategies(TransportPreference::Relay, false, true, false)
            .unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));

        let plan = plan_strategies(TransportPreference::Relay, false, true, true).unwrap();
        assert_eq!(plan, vec![Strategy::Relay]);
    }
}
