//! Browser executable discovery.

use std::path::{Path, PathBuf};

use tracing::debug;

use webhands_protocols::TransportError;

/// Environment override for the browser executable path.
pub const EXECUTABLE_ENV: &str = "WEBHANDS_BROWSER_PATH";

/// Resolve the browser executable.
///
/// Resolution order: explicit path, environment override, then the
/// platform's well-known install locations, with bare names looked up on
/// PATH.
pub fn resolve_executable(explicit: Option<&Path>) -> Result<PathBuf, TransportError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(TransportError::Config(format!(
            "browser executable '{}' does not exist",
            path.display()
        )));
    }

    if let Ok(value) = std::env::var(EXECUTABLE_ENV) {
        let path = PathBuf::from(&value);
        if path.exists() {
            debug!(path = %path.display(), "using browser from {}", EXECUTABLE_ENV);
            return Ok(path);
        }
        return Err(TransportError::Config(format!(
            "{} points at '{}' which does not exist",
            EXECUTABLE_ENV, value
        )));
    }

    for candidate in platform_candidates() {
        let path = Path::new(candidate);
        if path.is_absolute() {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
        } else if let Ok(found) = which::which(candidate) {
            return Ok(found);
        }
    }

    Err(TransportError::ExecutableNotFound)
}

fn platform_candidates() -> &'static [&'static str] {
    #[cfg(target_os = "macos")]
    {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
    }

    #[cfg(target_os = "linux")]
    {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ]
    }

    #[cfg(target_os = "windows")]
    {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        &["chromium", "google-chrome"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_must_exist() {
        let err = resolve_executable(Some(Path::new("/nonexistent/browser"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_explicit_path_wins() {
        // Any existing file is accepted; discovery is not consulted.
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolved = resolve_executable(Some(file.path())).unwrap();
        assert_eq!(resolved, file.path());
    }

    #[test]
    fn test_platform_candidates_nonempty() {
        assert!(!platform_candidates().is_empty());
    }
}
