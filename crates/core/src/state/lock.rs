//! Advisory file lock for the calibration state store.
//!
//! Workers processing calibration sequences all load-mutate-save the same
//! snapshot, so the critical section is guarded by a lock file created with
//! `create_new`. The lock is advisory: a holder that crashes leaves its file
//! behind, so acquisition detects stale holders (holder process gone, or
//! unreadable lock contents) and forcibly clears them. A lock whose holder
//! is still alive is never stolen, however long it has been held.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Sleep between acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Errors from lock acquisition.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock stayed held for the whole acquisition timeout.
    #[error("timed out acquiring lock {0}")]
    Timeout(PathBuf),

    /// Filesystem error while manipulating the lock file.
    #[error("lock io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Contents of the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    holder_id: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn new(holder_id: &str) -> Self {
        Self {
            holder_id: holder_id.to_string(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    fn is_stale(&self) -> bool {
        !process_alive(self.pid)
    }
}

/// Whether a process with the given pid exists on this host.
fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    Path::new(&format!("/proc/{pid}")).exists()
}

/// A named advisory lock backed by a lock file.
pub struct FileLock {
    path: PathBuf,
    holder_id: String,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            holder_id: Uuid::new_v4().to_string(),
        }
    }

    /// Acquires the lock, retrying until `timeout` expires.
    ///
    /// A lock left behind by a process that no longer exists is forcibly
    /// released and taken over; one held by a live process is waited on.
    pub async fn acquire(&self, timeout: Duration) -> Result<LockGuard, LockError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.try_acquire()? {
                Some(guard) => return Ok(guard),
                None => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(LockError::Timeout(self.path.clone()));
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
            }
        }
    }

    fn try_acquire(&self) -> Result<Option<LockGuard>, LockError> {
        let info = LockInfo::new(&self.holder_id);
        let json = serde_json::to_vec(&info).expect("lock info serializes");
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                use std::io::Write;
                file.write_all(&json).map_err(|source| LockError::Io {
                    path: self.path.clone(),
                    source,
                })?;
                Ok(Some(LockGuard {
                    path: self.path.clone(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if self.holder_is_stale() {
                    warn!(
                        "Forcibly releasing stale lock {} (holder process gone)",
                        self.path.display()
                    );
                    match std::fs::remove_file(&self.path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(source) => {
                            return Err(LockError::Io {
                                path: self.path.clone(),
                                source,
                            })
                        }
                    }
                }
                Ok(None)
            }
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn holder_is_stale(&self) -> bool {
        match std::fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<LockInfo>(&bytes) {
                Ok(info) => info.is_stale(),
                // Unreadable lock contents: treat as stale rather than
                // deadlocking forever.
                Err(_) => true,
            },
            Err(_) => false,
        }
    }
}

/// Held lock; releasing removes the lock file.
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to release lock {}: {}", self.path.display(), e);
            }
        }
    }
}
