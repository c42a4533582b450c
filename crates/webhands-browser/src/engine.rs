//! Action execution engine.
//!
//! Runs a canonical action list strictly in order against one page handle,
//! with a per-action timeout. Wait conditions use the backend's native wait
//! primitives when the handle exposes them, otherwise a generic polling
//! adapter at a fixed interval. The sequence stops at the first failure; the
//! failure names the action index and type.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use webhands_protocols::{Action, ActionError, ActionResult, LoadState};

use crate::page::{PageError, PageHandle};

/// Fixed interval for the polling wait adapter.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A failed action, carrying everything completed before it.
#[derive(Debug)]
pub struct ActionFailure {
    pub index: usize,
    pub action: String,
    pub error: ActionError,
    /// Results produced before the failure; not surfaced to callers, kept
    /// for diagnostics.
    pub completed: Vec<ActionResult>,
}

impl std::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "action {} ({}) failed: {}",
            self.index, self.action, self.error
        )
    }
}

impl std::error::Error for ActionFailure {}

/// Executes action lists against page handles.
pub struct ActionEngine {
    workspace_root: PathBuf,
    default_timeout_ms: u64,
}

impl ActionEngine {
    pub fn new(workspace_root: PathBuf, default_timeout_ms: u64) -> Self {
        Self {
            workspace_root,
            default_timeout_ms,
        }
    }

    /// Run `actions` in order. Stops at the first failure.
    pub async fn run(
        &self,
        page: &dyn PageHandle,
        actions: &[Action],
    ) -> Result<Vec<ActionResult>, ActionFailure> {
        let mut results = Vec::with_capacity(actions.len());

        for (index, action) in actions.iter().enumerate() {
            debug!(index, action = action.tag(), "executing action");
            match self.execute_with_timeout(page, action).await {
                Ok(result) => results.push(result),
                Err(error) => {
                    return Err(ActionFailure {
                        index,
                        action: action.tag().to_string(),
                        error,
                        completed: results,
                    });
                }
            }
        }

        Ok(results)
    }

    async fn execute_with_timeout(
        &self,
        page: &dyn PageHandle,
        action: &Action,
    ) -> Result<ActionResult, ActionError> {
        let budget_ms = match action {
            // A bare wait's own duration is its budget.
            Action::Wait { .. } => {
                return self.execute(page, action).await;
            }
            // Conditional waits enforce their own deadline; the outer timeout
            // is only a backstop against a stuck backend call.
            Action::WaitFor { timeout_ms, .. } => {
                timeout_ms.unwrap_or(self.default_timeout_ms) + 500
            }
            _ => self.default_timeout_ms,
        };

        match tokio::time::timeout(Duration::from_millis(budget_ms), self.execute(page, action))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout {
                action: action.tag().to_string(),
                timeout_ms: budget_ms,
            }),
        }
    }

    async fn execute(
        &self,
        page: &dyn PageHandle,
        action: &Action,
    ) -> Result<ActionResult, ActionError> {
        let mut result = ActionResult::new(action);

        match action {
            Action::Navigate { url } => {
                page.navigate(url).await?;
                result.url = Some(page.url().await?);
            }
            Action::Click { selector } => {
                page.click(selector).await?;
            }
            Action::Type {
                selector,
                text,
                submit,
            } => {
                page.fill(selector, text).await?;
                if *submit {
                    page.press_key("Enter").await?;
                }
            }
            Action::PressKey { key } => {
                page.press_key(key).await?;
            }
            Action::Scroll { dx, dy } => {
                page.scroll(*dx, *dy).await?;
            }
            Action::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                result.ms = Some(*ms);
            }
            Action::WaitFor {
                selector,
                url_glob,
                load_state,
                predicate,
                timeout_ms,
            } => {
                let timeout = timeout_ms.unwrap_or(self.default_timeout_ms);
                let started = Instant::now();
                self.wait_for(
                    page,
                    selector.as_deref(),
                    url_glob.as_deref(),
                    *load_state,
                    predicate.as_deref(),
                    timeout,
                )
                .await?;
                result.ms = Some(started.elapsed().as_millis() as u64);
            }
            Action::ExtractText {
                selector,
                max_chars,
            } => {
                let text = page.inner_text(selector.as_deref()).await?;
                let truncated = text.chars().count() > *max_chars;
                let text = if truncated {
                    text.chars().take(*max_chars).collect()
                } else {
                    text
                };
                result.text = Some(text);
                result.truncated = Some(truncated);
            }
            Action::Screenshot { path, full_page } => {
                let output = self.resolve_screenshot_path(path.as_deref())?;
                let bytes = page.screenshot(*full_page).await?;
                if let Some(parent) = output.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&output, bytes)?;
                result.path = Some(output.display().to_string());
            }
            Action::Evaluate { expression } => {
                let value = page.evaluate(expression).await?;
                result.value = Some(value);
            }
        }

        Ok(result)
    }

    // ========================================================================
    // Conditional wait
    // ========================================================================

    /// Satisfy every given condition, native primitive or poll, within one
    /// shared deadline.
    async fn wait_for(
        &self,
        page: &dyn PageHandle,
        selector: Option<&str>,
        url_glob: Option<&str>,
        load_state: Option<LoadState>,
        predicate: Option<&str>,
        timeout_ms: u64,
    ) -> Result<(), ActionError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        if let Some(selector) = selector {
            let describe = format!("selector '{}' visible", selector);
            match page.native_waits() {
                Some(native) => {
                    native
                        .wait_for_selector(selector, remaining_ms(deadline))
                        .await
                        .map_err(|e| wait_error(e, &describe, timeout_ms))?;
                }
                None => {
                    self.poll(page, deadline, timeout_ms, &describe, |page| {
                        let selector = selector.to_string();
                        async move { page.selector_visible(&selector).await }
                    })
                    .await?;
                }
            }
        }

        if let Some(glob_expr) = url_glob {
            let pattern = glob::Pattern::new(glob_expr).map_err(|e| {
                ActionError::Page(format!("invalid url glob '{}': {}", glob_expr, e))
            })?;
            let describe = format!("url matching '{}'", glob_expr);
            match page.native_waits() {
                Some(native) => {
                    native
                        .wait_for_url_glob(glob_expr, remaining_ms(deadline))
                        .await
                        .map_err(|e| wait_error(e, &describe, timeout_ms))?;
                }
                None => {
                    self.poll(page, deadline, timeout_ms, &describe, |page| {
                        let pattern = pattern.clone();
                        async move { Ok(pattern.matches(&page.url().await?)) }
                    })
                    .await?;
                }
            }
        }

        if let Some(state) = load_state {
            let describe = format!("load state '{}'", state.as_str());
            match page.native_waits() {
                Some(native) => {
                    native
                        .wait_for_load_state(state, remaining_ms(deadline))
                        .await
                        .map_err(|e| wait_error(e, &describe, timeout_ms))?;
                }
                None => {
                    // networkidle has no direct CDP observable here; require
                    // two consecutive "complete" polls as a quiet window.
                    let mut consecutive = 0u32;
                    let needed = if state == LoadState::NetworkIdle { 2 } else { 1 };
                    loop {
                        let ready = page.ready_state().await.map_err(ActionError::from)?;
                        let satisfied = match state {
                            LoadState::DomContentLoaded => {
                                ready == "interactive" || ready == "complete"
                            }
                            LoadState::Load | LoadState::NetworkIdle => ready == "complete",
                        };
                        consecutive = if satisfied { consecutive + 1 } else { 0 };
                        if consecutive >= needed {
                            break;
                        }
                        if Instant::now() >= deadline {
                            return Err(ActionError::WaitTimeout {
                                condition: describe,
                                timeout_ms,
                            });
                        }
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                }
            }
        }

        if let Some(expression) = predicate {
            let describe = format!("predicate '{}'", expression);
            match page.native_waits() {
                Some(native) => {
                    native
                        .wait_for_predicate(expression, remaining_ms(deadline))
                        .await
                        .map_err(|e| wait_error(e, &describe, timeout_ms))?;
                }
                None => {
                    let wrapped = format!("!!({})", expression);
                    self.poll(page, deadline, timeout_ms, &describe, move |page| {
                        let wrapped = wrapped.clone();
                        async move {
                            Ok(page.evaluate(&wrapped).await?.as_bool().unwrap_or(false))
                        }
                    })
                    .await?;
                }
            }
        }

        Ok(())
    }

    /// Generic polling adapter: check at a fixed interval until true or the
    /// deadline passes.
    async fn poll<'a, F, Fut>(
        &self,
        page: &'a dyn PageHandle,
        deadline: Instant,
        timeout_ms: u64,
        condition: &str,
        mut check: F,
    ) -> Result<(), ActionError>
    where
        F: FnMut(&'a dyn PageHandle) -> Fut,
        Fut: std::future::Future<Output = Result<bool, PageError>>,
    {
        loop {
            if check(page).await.map_err(ActionError::from)? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ActionError::WaitTimeout {
                    condition: condition.to_string(),
                    timeout_ms,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    // ========================================================================
    // Screenshot paths
    // ========================================================================

    /// Resolve the output path, defaulting to a timestamped file and
    /// rejecting anything that escapes the workspace root.
    fn resolve_screenshot_path(&self, requested: Option<&str>) -> Result<PathBuf, ActionError> {
        let requested_path = match requested {
            Some(p) => PathBuf::from(p),
            None => PathBuf::from("screenshots").join(format!(
                "page-{}.png",
                chrono::Utc::now().format("%Y%m%d-%H%M%S%3f")
            )),
        };

        let joined = if requested_path.is_absolute() {
            requested_path.clone()
        } else {
            self.workspace_root.join(&requested_path)
        };

        let normalized = normalize_lexically(&joined);
        let root = normalize_lexically(&self.workspace_root);
        if !normalized.starts_with(&root) {
            return Err(ActionError::PathEscape(
                requested.unwrap_or_default().to_string(),
            ));
        }
        Ok(normalized)
    }
}

/// Map a native wait's timeout onto the descriptive wait error; pass other
/// backend failures through.
fn wait_error(e: PageError, condition: &str, timeout_ms: u64) -> ActionError {
    match e {
        PageError::Timeout(_) => ActionError::WaitTimeout {
            condition: condition.to_string(),
            timeout_ms,
        },
        other => other.into(),
    }
}

fn remaining_ms(deadline: Instant) -> u64 {
    deadline
        .saturating_duration_since(Instant::now())
        .as_millis()
        .max(1) as u64
}

/// Resolve `.` and `..` without touching the filesystem; `..` above the
/// start is clamped, which the containment check then rejects.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
