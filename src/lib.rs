//! # media-dl
//!
//! Embeddable media download scheduler with bounded queueing and
//! cooperative cancellation.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Engine-agnostic** - The extraction/download engine is injected
//!   through the [`FetchOperation`] trait
//! - **Bounded** - A fixed worker pool and fail-fast admission control;
//!   callers are rejected synchronously instead of queueing unboundedly
//! - **Event-driven** - Consumers subscribe to lifecycle events, no polling
//!   required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use media_dl::{Config, DownloadRequest, MediaDownloader, NoCredentialProvider};
//! # use std::path::Path;
//! # use media_dl::{DownloadRequest as Req, FetchError, FetchOperation, FetchOutcome, MediaInfo, ProgressCallback};
//! # struct MyEngine;
//! # #[async_trait::async_trait]
//! # impl FetchOperation for MyEngine {
//! #     fn name(&self) -> &str { "my-engine" }
//! #     async fn probe(&self, _request: &Req) -> Result<MediaInfo, FetchError> {
//! #         Ok(MediaInfo { title: "clip".into(), size_bytes: None, duration_secs: None })
//! #     }
//! #     async fn fetch(
//! #         &self,
//! #         _request: &Req,
//! #         workspace: &Path,
//! #         _on_progress: ProgressCallback<'_>,
//! #         _cancel: tokio_util::sync::CancellationToken,
//! #     ) -> Result<FetchOutcome, FetchError> {
//! #         Ok(FetchOutcome { file_path: workspace.join("clip.mp4"), size_bytes: None })
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(
//!         Config::default(),
//!         Arc::new(MyEngine),
//!         Arc::new(NoCredentialProvider),
//!     )
//!     .await?;
//!
//!     downloader.start().await?;
//!
//!     let id = downloader
//!         .add_download(DownloadRequest::new("https://example.com/watch?v=abc"))
//!         .await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let record = downloader.get(&id).await?;
//!     println!("status: {:?}", record.status);
//!
//!     downloader.stop().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Workspace and artifact lifecycle
pub mod artifact;
/// Configuration types
pub mod config;
/// Per-task credential provisioning
pub mod credentials;
/// Error types
pub mod error;
/// Fetch engine abstraction
pub mod fetch;
/// Progress event normalization
pub mod progress;
/// Bounded admission queue
pub mod queue;
/// Retry logic with exponential backoff
pub mod retry;
/// Download scheduler (decomposed into focused submodules)
pub mod scheduler;
/// Thread-safe task table
pub mod store;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{CleanupConfig, Config, LimitsConfig, RetryConfig, SchedulerConfig};
pub use credentials::{
    CookieJarProvider, CredentialHandle, CredentialProvider, NoCredentialProvider,
};
pub use error::{Error, FetchError, Result, ToHttpStatus};
pub use fetch::{FetchOperation, FetchOutcome, MediaInfo, ProgressCallback, ProgressSignal};
pub use progress::ProgressUpdate;
pub use queue::BoundedQueue;
pub use scheduler::MediaDownloader;
pub use store::TaskStore;
pub use types::{
    DownloadRequest, Event, Quality, QueueStatus, Status, TaskId, TaskRecord, VideoFormat,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `stop()`
/// method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.stop().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
