//! Browser process launcher.
//!
//! Spawns the browser with `--remote-debugging-port=0` (OS-assigned) and
//! discovers the assigned endpoint by racing two signals: the
//! `DevToolsActivePort` file the browser writes into its profile directory,
//! and the `DevTools listening on ws://...` announcement on stderr. Whichever
//! resolves first wins; the child exiting or the deadline elapsing fails the
//! launch.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use webhands_protocols::TransportError;

use crate::lock::pid_alive;

/// How long a terminated browser gets before SIGKILL.
const KILL_GRACE: Duration = Duration::from_millis(2_000);

/// Poll interval for the `DevToolsActivePort` file.
const PORT_FILE_POLL: Duration = Duration::from_millis(100);

/// Launch parameters.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    /// Unpacked extension directories to load (process-spawn strategies only).
    pub extension_dirs: Vec<PathBuf>,
    pub launch_timeout_ms: u64,
}

/// A spawned browser process with its discovered debugging endpoint.
pub struct SpawnedBrowser {
    child: Option<Child>,
    pub pid: u32,
    pub ws_url: String,
    pub port: u16,
}

impl SpawnedBrowser {
    /// HTTP form of the debugging endpoint.
    pub fn http_endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Terminate the process: graceful signal first, forced kill after the
    /// grace period. Idempotent.
    pub async fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        match tokio::time::timeout(KILL_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "browser exited"),
            Ok(Err(e)) => warn!("error waiting for browser exit: {}", e),
            Err(_) => {
                warn!("browser ignored termination signal, killing");
                let _ = child.kill().await;
            }
        }
    }
}

impl Drop for SpawnedBrowser {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}

/// Spawn the browser and discover its debugging endpoint.
pub async fn launch(options: &LaunchOptions) -> Result<SpawnedBrowser, TransportError> {
    std::fs::create_dir_all(&options.user_data_dir)?;

    // A leftover port file from a previous run must not win the race.
    let port_file = options.user_data_dir.join("DevToolsActivePort");
    let _ = std::fs::remove_file(&port_file);

    let args = build_args(options);
    info!(
        executable = %options.executable.display(),
        profile = %options.user_data_dir.display(),
        headless = options.headless,
        "launching browser"
    );

    let mut child = Command::new(&options.executable)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TransportError::LaunchFailed(e.to_string()))?;

    let pid = child
        .id()
        .ok_or_else(|| TransportError::LaunchFailed("browser exited immediately".to_string()))?;

    // Stderr scanning runs as its own task and keeps draining after the
    // announcement so the pipe never fills up.
    let (stderr_tx, mut stderr_rx) = mpsc::channel::<String>(1);
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let pattern = Regex::new(r"DevTools listening on (ws://\S+)").unwrap();
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            let mut announced = false;
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("[browser] {}", line);
                if !announced {
                    if let Some(captures) = pattern.captures(&line) {
                        announced = true;
                        let _ = stderr_tx.send(captures[1].to_string()).await;
                    }
                }
            }
        });
    }

    // Race the port file against the stderr announcement; the child exiting
    // or the deadline elapsing fails the launch.
    let deadline = std::time::Instant::now() + Duration::from_millis(options.launch_timeout_ms);
    let ws_url = loop {
        if let Some(ws_url) = read_port_file(&port_file) {
            break ws_url;
        }
        if let Ok(ws_url) = stderr_rx.try_recv() {
            break ws_url;
        }
        if let Some(status) = child
            .try_wait()
            .map_err(|e| TransportError::LaunchFailed(e.to_string()))?
        {
            return Err(TransportError::LaunchFailed(format!(
                "browser exited before exposing a debugging endpoint ({})",
                status
            )));
        }
        if std::time::Instant::now() >= deadline {
            let _ = child.start_kill();
            return Err(TransportError::LaunchTimeout(options.launch_timeout_ms));
        }
        tokio::time::sleep(PORT_FILE_POLL).await;
    };

    let port = port_from_ws_url(&ws_url).ok_or_else(|| {
        TransportError::LaunchFailed(format!("unparsable debugging endpoint '{}'", ws_url))
    })?;

    info!(pid, port, "browser debugging endpoint discovered");
    Ok(SpawnedBrowser {
        child: Some(child),
        pid,
        ws_url,
        port,
    })
}

/// Parse `DevToolsActivePort`: first line is the port, second the browser
/// WebSocket path.
fn read_port_file(path: &Path) -> Option<String> {
    let body = std::fs::read_to_string(path).ok()?;
    let mut lines = body.lines();
    let port: u16 = lines.next()?.trim().parse().ok()?;
    let ws_path = lines.next()?.trim();
    if port == 0 || ws_path.is_empty() {
        return None;
    }
    Some(format!("ws://127.0.0.1:{}{}", port, ws_path))
}

fn port_from_ws_url(ws_url: &str) -> Option<u16> {
    url::Url::parse(ws_url).ok()?.port()
}

fn build_args(options: &LaunchOptions) -> Vec<String> {
    let mut args = vec![
        "--remote-debugging-port=0".to_string(),
        format!("--user-data-dir={}", options.user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--metrics-recording-only".to_string(),
        "--password-store=basic".to_string(),
        "--window-size=1280,720".to_string(),
    ];

    if !options.extension_dirs.is_empty() {
        let joined = options
            .extension_dirs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        args.push(format!("--disable-extensions-except={}", joined));
        args.push(format!("--load-extension={}", joined));
    }

    if options.headless {
        args.push("--headless=new".to_string());
    }

    args.push("about:blank".to_string());
    args
}

// ============================================================================
// Endpoint records
// ============================================================================

/// Recorded debugging endpoint of a still-running browser, written into a
/// persistent profile so a later invocation can re-attach without
/// relaunching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    pub port: u16,
    pub ws_url: String,
    pub pid: u32,
}

impl EndpointRecord {
    const FILE: &'static str = "cdp-endpoint.json";

    pub fn from_spawned(spawned: &SpawnedBrowser) -> Self {
        Self {
            port: spawned.port,
            ws_url: spawned.ws_url.clone(),
            pid: spawned.pid,
        }
    }

    pub fn path(profile_dir: &Path) -> PathBuf {
        profile_dir.join(Self::FILE)
    }

    pub fn write(&self, profile_dir: &Path) -> std::io::Result<()> {
        let body = serde_json::to_vec(self).map_err(std::io::Error::other)?;
        std::fs::write(Self::path(profile_dir), body)
    }

    /// Read the record if present and its process is still alive.
    pub fn read_live(profile_dir: &Path) -> Option<Self> {
        let body = std::fs::read_to_string(Self::path(profile_dir)).ok()?;
        let record: Self = serde_json::from_str(&body).ok()?;
        if pid_alive(record.pid) {
            Some(record)
        } else {
            debug!(pid = record.pid, "ignoring endpoint record of dead process");
            None
        }
    }

    pub fn remove(profile_dir: &Path) {
        let _ = std::fs::remove_file(Self::path(profile_dir));
    }

    pub fn http_endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(dir: &Path) -> LaunchOptions {
        LaunchOptions {
            executable: PathBuf::from("/usr/bin/true"),
            user_data_dir: dir.to_path_buf(),
            headless: true,
            extension_dirs: vec![],
            launch_timeout_ms: 10_000,
        }
    }

    #[test]
    fn test_build_args_basics() {
        let dir = TempDir::new().unwrap();
        let args = build_args(&options(dir.path()));
        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-data-dir=")));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--load-extension")));
        assert_eq!(args.last().unwrap(), "about:blank");
    }

    #[test]
    fn test_build_args_with_extensions() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(dir.path());
        opts.extension_dirs = vec![PathBuf::from("/ext/a"), PathBuf::from("/ext/b")];
        let args = build_args(&opts);
        assert!(args.contains(&"--load-extension=/ext/a,/ext/b".to_string()));
        assert!(args.contains(&"--disable-extensions-except=/ext/a,/ext/b".to_string()));
    }

    #[test]
    fn test_read_port_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("DevToolsActivePort");
        std::fs::write(&path, "38291\n/devtools/browser/abc-def\n").unwrap();
        assert_eq!(
            read_port_file(&path).unwrap(),
            "ws://127.0.0.1:38291/devtools/browser/abc-def"
        );
    }

    #[test]
    fn test_read_port_file_incomplete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("DevToolsActivePort");
        std::fs::write(&path, "38291\n").unwrap();
        assert!(read_port_file(&path).is_none());
        assert!(read_port_file(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn test_port_from_ws_url() {
        assert_eq!(
            port_from_ws_url("ws://127.0.0.1:9222/devtools/browser/x"),
            Some(9222)
        );
        assert_eq!(port_from_ws_url("not a url"), None);
    }

    #[test]
    fn test_endpoint_record_round_trip() {
        let dir = TempDir::new().unwrap();
        let record = EndpointRecord {
            port: 9222,
            ws_url: "ws://127.0.0.1:9222/devtools/browser/x".to_string(),
            pid: std::process::id(),
        };
        record.write(dir.path()).unwrap();
        assert_eq!(EndpointRecord::read_live(dir.path()), Some(record));
    }

    #[test]
    fn test_endpoint_record_dead_pid_ignored() {
        let dir = TempDir::new().unwrap();
        let record = EndpointRecord {
            port: 9222,
            ws_url: "ws://127.0.0.1:9222/devtools/browser/x".to_string(),
            pid: u32::MAX - 1,
        };
        record.write(dir.path()).unwrap();
        assert!(EndpointRecord::read_live(dir.path()).is_none());
    }

    #[test]
    fn test_endpoint_record_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        EndpointRecord::remove(dir.path());
        EndpointRecord::remove(dir.path());
    }
}
