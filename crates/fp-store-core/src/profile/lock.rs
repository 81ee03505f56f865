//! Per-window mutual exclusion for profile creation.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Exclusive advisory lock on a window's lock file, released on drop.
#[derive(Debug)]
pub struct WindowLock {
    file: File,
    path: PathBuf,
}

impl WindowLock {
    /// Poll for the lock until `timeout` elapses.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io_with_path(e, path))?;

        let started = Instant::now();
        let mut contended = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("Acquired window lock {}", path.display());
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if !contended {
                        debug!("Waiting for window lock {}", path.display());
                        contended = true;
                    }
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(StoreError::LockTimeout {
                            key: path.display().to_string(),
                            waited,
                        });
                    }
                    thread::sleep(StoreConfig::LOCK_POLL_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(StoreError::io_with_path(e, path)),
            }
        }
    }
}

impl Drop for WindowLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release window lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_times_out_then_succeeds_after_drop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".1610000000.stats.bar.fp.lock");

        let held = WindowLock::acquire(&path, Duration::from_secs(1)).unwrap();
        let err = WindowLock::acquire(&path, Duration::from_millis(120)).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        drop(held);
        assert!(WindowLock::acquire(&path, Duration::from_millis(120)).is_ok());
    }
}
