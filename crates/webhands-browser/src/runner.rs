//! Request runner: negotiate a transport, drive the action list, build the
//! summary, and tear everything down on every exit path.

use thiserror::Error;
use tracing::{debug, info};

use webhands_protocols::{
    BrowserRequest, BrowserSummary, RequestError, TransportError,
};

use crate::config::BrowserConfig;
use crate::engine::{ActionEngine, ActionFailure};
use crate::negotiator::{TransportNegotiator, TransportSession};

/// Request-level failure. One descriptive error per request; partial action
/// results are not surfaced.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to open start url: {0}")]
    StartNavigation(String),

    #[error(transparent)]
    Action(#[from] ActionFailure),
}

/// Runs browser requests end to end.
pub struct BrowserRunner {
    negotiator: TransportNegotiator,
}

impl BrowserRunner {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            negotiator: TransportNegotiator::new(config),
        }
    }

    /// Execute one request. Resources are released in reverse-acquisition
    /// order whether the action list succeeds or fails.
    pub async fn run(&self, request: &BrowserRequest) -> Result<BrowserSummary, RunError> {
        // Validation happens before any resource is acquired.
        let actions = request.normalized_actions()?;

        let session = self.negotiator.connect(request).await?;

        let outcome = self.drive(&session, request, &actions).await;

        let kind = session.kind;
        let reused = session.reused_existing;
        let persistent = session.persistent;
        let profile_id = session.profile_id.clone();
        let profile_dir = session.profile_dir.display().to_string();
        session.close().await;
        debug!("session torn down");

        let (results, final_url, final_title) = outcome?;

        info!(
            transport = %kind,
            actions = results.len(),
            "request completed"
        );

        Ok(BrowserSummary {
            transport: kind,
            reused_existing_session: reused,
            persistent_profile: persistent,
            profile_id,
            profile_dir,
            final_url,
            final_title,
            results,
        })
    }

    async fn drive(
        &self,
        session: &TransportSession,
        request: &BrowserRequest,
        actions: &[webhands_protocols::Action],
    ) -> Result<
        (
            Vec<webhands_protocols::ActionResult>,
            Option<String>,
            Option<String>,
        ),
        RunError,
    > {
        let page = session.page.as_ref();

        if let Some(url) = &request.start_url {
            page.navigate(url)
                .await
                .map_err(|e| RunError::StartNavigation(e.to_string()))?;
        }

        let engine = ActionEngine::new(
            self.negotiator.config().workspace_root.clone(),
            request.action_timeout_ms(),
        );
        let results = engine.run(page, actions).await?;

        let final_url = page.url().await.ok();
        let final_title = page.title().await.ok();
        Ok((results, final_url, final_title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_display_names_action() {
        let failure = ActionFailure {
            index: 2,
            action: "click".to_string(),
            error: webhands_protocols::ActionError::ElementNotFound("#x".to_string()),
            completed: vec![],
        };
        let err: RunError = failure.into();
        let msg = err.to_string();
        assert!(msg.contains("action 2"));
        assert!(msg.contains("click"));
    }

    #[test]
    fn test_request_error_passthrough() {
        let err: RunError = RequestError::TooManyActions { count: 30, max: 25 }.into();
        assert!(err.to_string().contains("too many actions"));
    }
}
