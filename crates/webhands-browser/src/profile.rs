//! Profile selection: persistent named profiles or ephemeral temp dirs.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use webhands_protocols::TransportError;

use crate::lock::{ProfileLockGuard, ProfileLockManager};

/// The resolved profile backing one browser session.
#[derive(Debug)]
pub struct ProfileSelection {
    pub user_data_dir: PathBuf,
    pub persistent: bool,
    pub profile_id: Option<String>,
    /// Held for persistent profiles; released during teardown.
    pub lock: Option<ProfileLockGuard>,
    /// Owns the directory for ephemeral profiles; dropping deletes it.
    temp: Option<TempDir>,
}

impl ProfileSelection {
    /// Resolve a persistent profile under `profiles_root` and take its lock.
    pub fn persistent(
        locks: &ProfileLockManager,
        profiles_root: &Path,
        profile_id: &str,
    ) -> Result<Self, TransportError> {
        let id = sanitize_profile_id(profile_id)?;
        let user_data_dir = profiles_root.join(&id);
        std::fs::create_dir_all(&user_data_dir)?;
        let lock = locks.acquire(&user_data_dir)?;
        debug!(profile = %id, dir = %user_data_dir.display(), "persistent profile selected");
        Ok(Self {
            user_data_dir,
            persistent: true,
            profile_id: Some(id),
            lock: Some(lock),
            temp: None,
        })
    }

    /// Create a fresh ephemeral profile, deleted at teardown.
    pub fn ephemeral() -> Result<Self, TransportError> {
        let temp = tempfile::Builder::new()
            .prefix("webhands-profile-")
            .tempdir()?;
        let user_data_dir = temp.path().to_path_buf();
        debug!(dir = %user_data_dir.display(), "ephemeral profile created");
        Ok(Self {
            user_data_dir,
            persistent: false,
            profile_id: None,
            lock: None,
            temp: Some(temp),
        })
    }

    /// Release the lock and remove the directory if ephemeral.
    pub fn teardown(&mut self) {
        if let Some(mut lock) = self.lock.take() {
            lock.release();
        }
        if let Some(temp) = self.temp.take() {
            let path = temp.path().to_path_buf();
            if let Err(e) = temp.close() {
                tracing::warn!(dir = %path.display(), "failed to remove ephemeral profile: {}", e);
            }
        }
    }
}

/// Restrict profile ids to path-safe names; a profile id is a directory name,
/// never a path.
fn sanitize_profile_id(id: &str) -> Result<String, TransportError> {
    let trimmed = id.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        || trimmed.starts_with('.')
    {
        return Err(TransportError::Config(format!(
            "invalid browser profile id '{}'",
            id
        )));
    }
    Ok(trimmed.to_string())
}

/// Default profiles root: `~/.webhands/profiles`.
pub fn default_profiles_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".webhands")
        .join("profiles")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ephemeral_profile_removed_on_teardown() {
        let mut selection = ProfileSelection::ephemeral().unwrap();
        let dir = selection.user_data_dir.clone();
        assert!(dir.exists());
        assert!(!selection.persistent);
        selection.teardown();
        assert!(!dir.exists());
    }

    #[test]
    fn test_persistent_profile_survives_teardown() {
        let root = TempDir::new().unwrap();
        let locks = ProfileLockManager::new();
        let mut selection =
            ProfileSelection::persistent(&locks, root.path(), "work").unwrap();
        let dir = selection.user_data_dir.clone();
        assert!(dir.exists());
        assert!(dir.join("profile.lock").exists());

        selection.teardown();
        assert!(dir.exists());
        assert!(!dir.join("profile.lock").exists());
    }

    #[test]
    fn test_profile_id_sanitization() {
        assert!(sanitize_profile_id("work").is_ok());
        assert!(sanitize_profile_id("work-2.bak").is_ok());
        assert!(sanitize_profile_id("").is_err());
        assert!(sanitize_profile_id("../escape").is_err());
        assert!(sanitize_profile_id("a/b").is_err());
        assert!(sanitize_profile_id(".hidden").is_err());
    }

    #[test]
    fn test_default_profiles_root() {
        let root = default_profiles_root();
        assert!(root.ends_with(".webhands/profiles"));
    }
}
