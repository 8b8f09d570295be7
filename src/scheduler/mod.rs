//! Download scheduler split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`lifecycle`] - Worker pool startup and shutdown coordination
//! - [`control`] - Public task operations (enqueue/get/cancel/remove/list)
//! - [`worker`] - Per-task state machine execution

mod control;
mod lifecycle;
mod worker;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::credentials::CredentialProvider;
use crate::error::{Error, Result};
use crate::fetch::FetchOperation;
use crate::queue::BoundedQueue;
use crate::store::TaskStore;
use crate::types::{DownloadRequest, Event, TaskId};

/// Queue and worker-pool state
pub(crate) struct QueueState {
    /// The bounded request queue plus worker handles, present while running
    pub(crate) running: tokio::sync::Mutex<Option<RunningState>>,
    /// Per-task cancellation tokens, created at enqueue and destroyed at removal
    pub(crate) cancel_tokens: tokio::sync::Mutex<HashMap<TaskId, CancellationToken>>,
    /// Flag to indicate whether new downloads are accepted (set to false during shutdown)
    pub(crate) accepting_new: AtomicBool,
}

/// State that only exists between `start()` and `stop()`
pub(crate) struct RunningState {
    pub(crate) queue: Arc<BoundedQueue<QueuedTask>>,
    pub(crate) workers: Vec<tokio::task::JoinHandle<()>>,
}

/// One queued unit of work handed from the facade to a worker
pub(crate) struct QueuedTask {
    pub(crate) id: TaskId,
    pub(crate) request: DownloadRequest,
    pub(crate) token: CancellationToken,
}

/// Main scheduler instance (cloneable - all fields are Arc-wrapped)
///
/// Owns the task store, the bounded admission queue, and the worker pool.
/// Construct one per process, inject it into the serving layer, and tie
/// [`start`](MediaDownloader::start) / [`stop`](MediaDownloader::stop) to
/// the host's lifecycle hooks.
#[derive(Clone)]
pub struct MediaDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Task record table
    pub(crate) store: Arc<TaskStore>,
    /// External fetch engine
    pub(crate) fetcher: Arc<dyn FetchOperation>,
    /// Per-task credential provisioning
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Queue and worker-pool state
    pub(crate) queue_state: Arc<QueueState>,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// Ensures the download and temp directories exist and sets up the event
    /// broadcast channel. Workers are not spawned until
    /// [`start`](Self::start) is called.
    pub async fn new(
        config: Config,
        fetcher: Arc<dyn FetchOperation>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download_dir.display(),
                        e
                    ),
                ))
            })?;
        tokio::fs::create_dir_all(&config.temp_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.temp_dir.display(),
                        e
                    ),
                ))
            })?;

        // Create broadcast channel with buffer size of 1000 events.
        // Multiple subscribers receive all events independently.
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let queue_state = Arc::new(QueueState {
            running: tokio::sync::Mutex::new(None),
            cancel_tokens: tokio::sync::Mutex::new(HashMap::new()),
            accepting_new: AtomicBool::new(true),
        });

        tracing::info!(
            fetcher = fetcher.name(),
            download_dir = %config.download_dir.display(),
            "Media downloader initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(TaskStore::new()),
            fetcher,
            credentials,
            event_tx,
            queue_state,
        })
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all
    /// events independently. Events are buffered; a subscriber that falls
    /// behind by more than 1000 events receives a `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// download processing never depends on listeners.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Workspace directory for a task id
    pub(crate) fn workspace_dir(&self, id: &TaskId) -> PathBuf {
        self.config.temp_dir.join(format!("task_{}", id))
    }
}
