//! Single-instance lock: one poller per lock file.
//!
//! Ownership is decided by an exclusive, non-blocking advisory lock on the
//! file. The pid written into the file is for diagnostics only.

use courier_core::error::CourierError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Exclusive ownership of a lock file, released when dropped.
///
/// If the process dies without unwinding, the kernel drops the lock along
/// with the descriptor.
#[derive(Debug)]
pub struct InstanceGuard {
    file: File,
    path: PathBuf,
}

/// Who, if anyone, holds a lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Free,
    /// Held by a running poller; `pid` as recorded in the file.
    Held { pid: Option<u32> },
}

impl InstanceGuard {
    /// Take the lock at `path`, creating the file if needed.
    ///
    /// Fails with `AlreadyRunning` when another holder exists and with
    /// `LockUnavailable` when the file cannot be opened or locked.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, CourierError> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| unavailable("cannot open lock file", path, e))?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            if is_contended(&e) {
                return Err(CourierError::AlreadyRunning {
                    pid: read_pid(&mut file),
                });
            }
            return Err(unavailable("cannot lock", path, e));
        }

        let pid = std::process::id();
        write_pid(&mut file, pid).map_err(|e| unavailable("cannot write pid to", path, e))?;

        info!("instance lock acquired: {} (pid {pid})", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Check whether `path` is held without taking ownership or touching
    /// its content. A missing file is free.
    ///
    /// The check holds a shared lock for an instant, so a poller starting
    /// at that exact moment can still be refused.
    pub fn probe(path: impl AsRef<Path>) -> Result<LockStatus, CourierError> {
        let path = path.as_ref();
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LockStatus::Free),
            Err(e) => return Err(unavailable("cannot open lock file", path, e)),
        };

        match FileExt::try_lock_shared(&file) {
            Ok(()) => {
                if let Err(e) = FileExt::unlock(&file) {
                    warn!("failed to unlock {}: {e}", path.display());
                }
                Ok(LockStatus::Free)
            }
            Err(e) if is_contended(&e) => Ok(LockStatus::Held {
                pid: read_pid(&mut file),
            }),
            Err(e) => Err(unavailable("cannot inspect", path, e)),
        }
    }

    /// Path of the held lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        // The file stays on disk: unlinking it would let a late opener lock
        // an orphaned inode while a newcomer locks a fresh one.
        if let Err(e) = self.file.set_len(0) {
            warn!("failed to clear lock file {}: {e}", self.path.display());
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("failed to unlock {}: {e}", self.path.display());
        }
        info!("instance lock released: {}", self.path.display());
    }
}

fn unavailable(action: &str, path: &Path, e: io::Error) -> CourierError {
    CourierError::LockUnavailable(format!("{action} {}: {e}", path.display()))
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == fs2::lock_contended_error().kind()
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}

fn write_pid(file: &mut File, pid: u32) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{pid}")?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_records_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.lock");

        let guard = InstanceGuard::acquire(&path).unwrap();
        assert_eq!(guard.path(), path.as_path());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, std::process::id().to_string());
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.lock");

        let _first = InstanceGuard::acquire(&path).unwrap();
        // The lock conflicts across open file descriptions, even in one process.
        match InstanceGuard::acquire(&path) {
            Err(CourierError::AlreadyRunning { pid }) => {
                assert_eq!(pid, Some(std::process::id()));
            }
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
    }

    #[test]
    fn test_drop_releases_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.lock");

        let first = InstanceGuard::acquire(&path).unwrap();
        drop(first);
        assert!(path.exists(), "lock file is kept");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        let _second = InstanceGuard::acquire(&path).unwrap();
    }

    #[test]
    fn test_stale_pid_without_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.lock");
        std::fs::write(&path, "999999999").unwrap();

        let _guard = InstanceGuard::acquire(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_unopenable_path_is_lock_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("courier.lock");

        let err = InstanceGuard::acquire(&path).unwrap_err();
        assert!(
            matches!(err, CourierError::LockUnavailable(_)),
            "got {err:?}"
        );
    }

    #[test]
    fn test_probe_missing_file_is_free() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.lock");

        assert_eq!(InstanceGuard::probe(&path).unwrap(), LockStatus::Free);
        assert!(!path.exists(), "probing must not create the file");
    }

    #[test]
    fn test_probe_reports_holder_without_rewriting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.lock");

        let guard = InstanceGuard::acquire(&path).unwrap();
        assert_eq!(
            InstanceGuard::probe(&path).unwrap(),
            LockStatus::Held {
                pid: Some(std::process::id())
            }
        );
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );

        drop(guard);
        assert_eq!(InstanceGuard::probe(&path).unwrap(), LockStatus::Free);
        // A probe leaves the file free for the next owner.
        let _next = InstanceGuard::acquire(&path).unwrap();
    }
}
