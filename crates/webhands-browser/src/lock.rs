//! Profile lock manager.
//!
//! A persistent profile directory may only be used by one live process at a
//! time. The lock is a create-only file inside the profile directory holding
//! the owner's pid and acquisition time; cooperating processes treat it as
//! the single source of truth. A lock whose pid is no longer alive is stale
//! and reclaimed.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use webhands_protocols::LockError;

/// Lock file name inside a profile directory.
const LOCK_FILE: &str = "profile.lock";

/// On-disk lock record.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockRecord {
    pid: u32,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Issues and releases profile locks.
///
/// Constructed once and passed by reference wherever locking is needed; the
/// lock state itself lives on disk.
#[derive(Debug, Default)]
pub struct ProfileLockManager;

impl ProfileLockManager {
    pub fn new() -> Self {
        Self
    }

    /// Acquire the lock for `profile_dir`.
    ///
    /// Fails with [`LockError::ProfileBusy`] when another live process holds
    /// it. A lock already held by the calling process is reused idempotently:
    /// the returned guard is a no-op and will not release the original.
    pub fn acquire(&self, profile_dir: &Path) -> Result<ProfileLockGuard, LockError> {
        fs::create_dir_all(profile_dir)?;
        let path = profile_dir.join(LOCK_FILE);

        match self.try_create(&path) {
            Ok(()) => Ok(ProfileLockGuard::owned(path)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                self.acquire_contended(profile_dir, &path)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn acquire_contended(
        &self,
        profile_dir: &Path,
        path: &Path,
    ) -> Result<ProfileLockGuard, LockError> {
        let profile = profile_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| profile_dir.display().to_string());

        let holder = match self.read_record(path) {
            Ok(record) => record.pid,
            Err(e) => {
                // An unreadable record cannot name a live owner; treat it as
                // stale rather than wedging the profile forever.
                warn!(path = %path.display(), "reclaiming unreadable profile lock: {}", e);
                0
            }
        };

        if holder == std::process::id() {
            debug!(profile = %profile, "profile lock already held by this process");
            return Ok(ProfileLockGuard::borrowed(path.to_path_buf()));
        }

        if holder != 0 && pid_alive(holder) {
            return Err(LockError::ProfileBusy { profile, holder });
        }

        debug!(profile = %profile, stale_pid = holder, "reclaiming stale profile lock");
        let _ = fs::remove_file(path);

        // One retry only; a second collision means we raced another acquirer.
        match self.try_create(path) {
            Ok(()) => Ok(ProfileLockGuard::owned(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = self.read_record(path).map(|r| r.pid).unwrap_or(0);
                Err(LockError::ProfileBusy { profile, holder })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Exclusive create-only write of the lock record.
    fn try_create(&self, path: &Path) -> std::io::Result<()> {
        let record = LockRecord {
            pid: std::process::id(),
            created_at: chrono::Utc::now(),
        };
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let body = serde_json::to_vec(&record).map_err(std::io::Error::other)?;
        file.write_all(&body)?;
        file.flush()
    }

    fn read_record(&self, path: &Path) -> Result<LockRecord, LockError> {
        let body = fs::read_to_string(path)?;
        serde_json::from_str(&body).map_err(|e| LockError::Corrupt(e.to_string()))
    }
}

/// Releases the lock when dropped or explicitly released.
#[derive(Debug)]
pub struct ProfileLockGuard {
    path: PathBuf,
    /// False for idempotent same-process reuse: release is then a no-op.
    owned: bool,
    released: bool,
}

impl ProfileLockGuard {
    fn owned(path: PathBuf) -> Self {
        Self {
            path,
            owned: true,
            released: false,
        }
    }

    fn borrowed(path: PathBuf) -> Self {
        Self {
            path,
            owned: false,
            released: false,
        }
    }

    /// Delete the lock file if this guard owns it. Idempotent, never fails.
    pub fn release(&mut self) {
        if self.released || !self.owned {
            self.released = true;
            return;
        }
        self.released = true;
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "failed to remove profile lock: {}", e);
            }
        }
    }
}

impl Drop for ProfileLockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Zero-signal liveness probe. A permission error proves the process exists
/// but belongs to another user, so it counts as alive.
#[cfg(unix)]
pub(crate) fn pid_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub(crate) fn pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_lock(dir: &Path, pid: u32) {
        let record = LockRecord {
            pid,
            created_at: chrono::Utc::now(),
        };
        fs::write(
            dir.join(LOCK_FILE),
            serde_json::to_vec(&record).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = TempDir::new().unwrap();
        let manager = ProfileLockManager::new();
        let guard = manager.acquire(dir.path()).unwrap();
        assert!(dir.path().join(LOCK_FILE).exists());
        drop(guard);
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_same_process_reuse_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = ProfileLockManager::new();
        let mut first = manager.acquire(dir.path()).unwrap();
        let mut second = manager.acquire(dir.path()).unwrap();

        // The no-op guard must not release the real lock.
        second.release();
        assert!(dir.path().join(LOCK_FILE).exists());

        first.release();
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_busy_when_held_by_live_process() {
        let dir = TempDir::new().unwrap();
        // pid 1 always exists; probing it yields success or EPERM, both alive.
        write_lock(dir.path(), 1);
        let manager = ProfileLockManager::new();
        match manager.acquire(dir.path()) {
            Err(LockError::ProfileBusy { holder, .. }) => assert_eq!(holder, 1),
            other => panic!("expected ProfileBusy, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        // Far beyond any real pid_max, so the probe reports it dead.
        write_lock(dir.path(), u32::MAX - 1);
        let manager = ProfileLockManager::new();
        let guard = manager.acquire(dir.path()).unwrap();
        assert!(guard.owned);
    }

    #[test]
    fn test_corrupt_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LOCK_FILE), b"not json").unwrap();
        let manager = ProfileLockManager::new();
        assert!(manager.acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = ProfileLockManager::new();
        let mut guard = manager.acquire(dir.path()).unwrap();
        guard.release();
        guard.release();
        assert!(!dir.path().join(LOCK_FILE).exists());
    }
}
