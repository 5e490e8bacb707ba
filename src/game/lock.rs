//! File locking for the game store.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::Error;

/// Age after which a leftover lock file is considered stale.
const LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// How long to wait for a live lock before giving up.
const LOCK_WAIT: Duration = Duration::from_millis(2000);

const LOCK_POLL: Duration = Duration::from_millis(50);

fn lock_path_for(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.lock", path.display()))
}

fn lock_age(lock_path: &Path) -> Result<Duration, Error> {
    let modified = lock_path.metadata()?.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default())
}

/// Acquire an exclusive lock on a file, waiting briefly for a live holder.
pub fn acquire_lock(path: &Path) -> Result<LockHandle, Error> {
    let lock_path = lock_path_for(path);
    let mut waited = Duration::ZERO;

    loop {
        match File::options().write(true).create_new(true).open(&lock_path) {
            Ok(mut lock_file) => {
                lock_file.write_all(format!("{}\n", std::process::id()).as_bytes())?;
                lock_file.sync_all()?;
                tracing::trace!("Acquired lock: {}", lock_path.display());
                return Ok(LockHandle { lock_path });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                match lock_age(&lock_path) {
                    Ok(age) if age >= LOCK_TIMEOUT => {
                        tracing::warn!("Removing stale lock: {}", lock_path.display());
                        std::fs::remove_file(&lock_path).ok();
                        continue;
                    }
                    Ok(_) => {}
                    // Released between the open and this check, or unreadable.
                    // Either way it counts against the wait.
                    Err(e) => tracing::trace!("Lock age unknown for {}: {}", lock_path.display(), e),
                }
                if waited >= LOCK_WAIT {
                    return Err(Error::Persistence(format!(
                        "Lock file is held: {}",
                        lock_path.display()
                    )));
                }
                std::thread::sleep(LOCK_POLL);
                waited += LOCK_POLL;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Lock handle - releases lock when dropped.
pub struct LockHandle {
    lock_path: PathBuf,
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            tracing::warn!("Failed to release lock {}: {}", self.lock_path.display(), e);
        } else {
            tracing::trace!("Released lock: {}", self.lock_path.display());
        }
    }
}

/// Acquire lock, execute function, release lock.
pub fn with_lock<T, F>(path: &Path, f: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error>,
{
    let _lock = acquire_lock(path)?;
    f()
}
