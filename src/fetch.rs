//! Fetch engine abstraction
//!
//! The actual extraction/download engine (URL resolution, segment download,
//! muxing) lives outside this crate. Workers drive it through the
//! [`FetchOperation`] trait, which also enables fake engines in tests.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::types::DownloadRequest;

/// Instruction returned from a progress callback to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressSignal {
    /// Keep going
    Continue,
    /// Stop as soon as possible — cancellation was requested
    Abort,
}

/// Progress callback handed to the engine for each fetch.
///
/// The engine may invoke it from any point in its download loop with an
/// arbitrarily-shaped JSON event; see [`crate::progress::normalize`]. An
/// engine that receives [`ProgressSignal::Abort`] should stop and return
/// [`FetchError::Cancelled`]; engines without a native abort hook may finish
/// their current operation first — cancellation is best-effort, not
/// preemptive.
pub type ProgressCallback<'a> = &'a (dyn Fn(serde_json::Value) -> ProgressSignal + Send + Sync);

/// Metadata resolved for a request before downloading.
#[derive(Clone, Debug)]
pub struct MediaInfo {
    /// Media title
    pub title: String,

    /// Estimated artifact size in bytes, if the engine knows it
    pub size_bytes: Option<u64>,

    /// Media duration in seconds, if known
    pub duration_secs: Option<u64>,
}

/// Result of a successful fetch.
#[derive(Clone, Debug)]
pub struct FetchOutcome {
    /// Path of the downloaded artifact inside the workspace
    pub file_path: PathBuf,

    /// Final artifact size in bytes, if known
    pub size_bytes: Option<u64>,
}

/// Abstraction over the external media extraction/download engine.
#[async_trait::async_trait]
pub trait FetchOperation: Send + Sync {
    /// Name of this engine implementation, for logging.
    fn name(&self) -> &str;

    /// Resolve metadata for a request without downloading.
    async fn probe(&self, request: &DownloadRequest) -> Result<MediaInfo, FetchError>;

    /// Download the requested media into `workspace`.
    ///
    /// The engine should invoke `on_progress` as the transfer advances and
    /// honor `cancel` (or the `Abort` signal) as promptly as it can.
    async fn fetch(
        &self,
        request: &DownloadRequest,
        workspace: &Path,
        on_progress: ProgressCallback<'_>,
        cancel: CancellationToken,
    ) -> Result<FetchOutcome, FetchError>;
}
