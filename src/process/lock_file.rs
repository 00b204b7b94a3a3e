//! Stale lock cleanup around logout commands
//!
//! A crashed tool run can leave its lock file behind, after which every
//! later login blocks. Removal is best effort and never fails the caller.

use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of one cleanup attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCleanup {
    Removed,
    NotPresent,
    Failed,
}

/// Delete the lock file at `path` if it exists
pub fn remove_stale_lock(path: &Path) -> LockCleanup {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale lock file");
            LockCleanup::Removed
        }
        Err(err) if err.kind() == ErrorKind::NotFound => LockCleanup::NotPresent,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to remove stale lock file");
            LockCleanup::Failed
        }
    }
}
