//! Workspace and artifact lifecycle
//!
//! Every task gets an on-disk workspace under the configured temp directory.
//! The [`Workspace`] handle guarantees the directory is deleted exactly once
//! regardless of outcome — success, failure, or cancellation. Cleanup
//! failures are logged and retried by the stale-workspace janitor; they are
//! never surfaced to callers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use crate::error::Result;

/// Handle to a task's on-disk workspace.
///
/// `cleanup` is idempotent: concurrent or repeated calls delete the
/// directory at most once, and an already-removed path is not an error.
pub struct Workspace {
    dir: PathBuf,
    cleaned: AtomicBool,
}

impl Workspace {
    /// Create the workspace directory on disk.
    pub async fn create(dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("failed to create workspace '{}': {}", dir.display(), e),
            )
        })?;
        Ok(Self {
            dir,
            cleaned: AtomicBool::new(false),
        })
    }

    /// Path of the workspace directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete the workspace directory.
    ///
    /// Returns whether this call performed the deletion; repeat calls return
    /// `false` without touching the filesystem.
    pub async fn cleanup(&self) -> bool {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return false;
        }
        remove_dir_quiet(&self.dir).await;
        true
    }
}

/// Remove a directory tree, tolerating an already-missing path.
///
/// Deletion failures are logged as warnings; the janitor retries them on its
/// next sweep.
pub(crate) async fn remove_dir_quiet(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to delete workspace directory");
        }
    }
}

/// Remove a single file, tolerating an already-missing path.
pub(crate) async fn remove_file_quiet(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete artifact file");
        }
    }
}

/// Delete entries under `dir` that have not been modified for `max_age`.
///
/// This is the janitor hook: workers run it opportunistically before
/// starting a new workspace, and an embedding application may call it on a
/// timer. Returns the number of entries deleted. Individual deletion
/// failures are logged and skipped.
pub async fn cleanup_stale(dir: &Path, max_age: Duration) -> Result<usize> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut deleted = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to stat entry during stale cleanup");
                continue;
            }
        };
        if modified >= cutoff {
            continue;
        }

        let result = if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Reclaimed stale workspace entry");
                deleted += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete stale entry");
            }
        }
    }

    Ok(deleted)
}
