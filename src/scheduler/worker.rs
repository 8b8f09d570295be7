//! Worker loop — drives one task at a time through its state machine.
//!
//! Each worker dequeues a request, resolves metadata, runs the engine fetch
//! with a progress callback, finalizes the artifact, and reclaims the
//! workspace. Cancellation is cooperative: the token is consulted at every
//! checkpoint (before the probe, between probe and fetch, inside each
//! progress callback, and after the engine returns). A single task's failure
//! is contained in its record and never kills the loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::artifact::{self, Workspace};
use crate::config::LimitsConfig;
use crate::error::FetchError;
use crate::fetch::{MediaInfo, ProgressSignal};
use crate::progress::{self, ProgressUpdate};
use crate::queue::BoundedQueue;
use crate::retry::fetch_with_retry;
use crate::types::{Event, Status, TaskId};
use crate::utils::sanitize_filename;

use super::{MediaDownloader, QueuedTask};

/// Buffer size for the progress update channel; overflow drops updates
const PROGRESS_CHANNEL_BUFFER: usize = 64;

/// Outcome of a store-backed status transition.
enum Transition {
    /// The status changed
    Applied,
    /// The task is already terminal (a cancel won the race)
    Refused,
    /// The task was removed from the store mid-run
    Gone,
}

/// Worker loop: pull tasks from the queue until it shuts down.
pub(crate) async fn run_worker(
    worker_id: usize,
    queue: Arc<BoundedQueue<QueuedTask>>,
    downloader: MediaDownloader,
) {
    tracing::debug!(worker_id, "Worker started");
    while let Some(task) = queue.pop().await {
        process_task(&downloader, task).await;
    }
    tracing::debug!(worker_id, "Worker exiting");
}

/// Process one queued task: set up the workspace and credentials, drive the
/// state machine, then release and clean up on every exit path.
async fn process_task(dl: &MediaDownloader, task: QueuedTask) {
    let id = task.id.clone();

    // Cancelled while still queued — no work was started, nothing to clean
    if task.token.is_cancelled() {
        mark_cancelled(dl, &id).await;
        return;
    }

    // Opportunistic janitor pass before claiming new disk space
    if dl.config.cleanup.auto_clean
        && let Err(e) = artifact::cleanup_stale(&dl.config.temp_dir, dl.config.cleanup.stale_max_age).await
    {
        tracing::warn!(error = %e, "Stale workspace sweep failed");
    }

    let workspace = match Workspace::create(dl.workspace_dir(&id)).await {
        Ok(workspace) => workspace,
        Err(e) => {
            mark_failed(dl, &id, &e.to_string()).await;
            return;
        }
    };

    let credential = match dl.credentials.acquire(workspace.dir()).await {
        Ok(credential) => credential,
        Err(e) => {
            tracing::warn!(task_id = %id, error = %e, "Credential acquisition failed, continuing without");
            None
        }
    };

    execute(dl, &task, &workspace).await;

    // Guaranteed-release path: credentials and workspace are reclaimed no
    // matter how execute() exited.
    if let Some(handle) = credential {
        dl.credentials.release(handle).await;
    }
    workspace.cleanup().await;
}

/// Drive the task through `FetchingInfo → Downloading → Processing` to a
/// terminal state. All failures land in the task record.
async fn execute(dl: &MediaDownloader, task: &QueuedTask, workspace: &Workspace) {
    let id = &task.id;

    match transition(dl, id, Status::FetchingInfo).await {
        Transition::Applied => {}
        Transition::Refused | Transition::Gone => return,
    }

    let info = match fetch_with_retry(&dl.config.retry, || dl.fetcher.probe(&task.request)).await {
        Ok(info) => info,
        Err(e) => {
            mark_failed(dl, id, &e.to_string()).await;
            return;
        }
    };

    if let Err(e) = check_limits(&dl.config.limits, &info) {
        mark_failed(dl, id, &e.to_string()).await;
        return;
    }

    let found = dl
        .store
        .update(id, |record| {
            record.title = Some(info.title.clone());
            if record.total_bytes.is_none() {
                record.total_bytes = info.size_bytes;
            }
        })
        .await;
    if !found {
        return;
    }
    dl.emit_event(Event::MetadataResolved {
        id: id.clone(),
        title: info.title.clone(),
    });

    // Checkpoint between metadata resolution and the transfer
    if task.token.is_cancelled() {
        mark_cancelled(dl, id).await;
        return;
    }

    match transition(dl, id, Status::Downloading).await {
        Transition::Applied => {}
        Transition::Refused | Transition::Gone => return,
    }

    // Progress flows through a bounded channel to a small applier task so
    // the engine's callback stays synchronous and never blocks on the store.
    let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_BUFFER);
    let applier = spawn_progress_applier(id.clone(), dl.clone(), progress_rx);

    let token = task.token.clone();
    let on_progress = move |event: serde_json::Value| -> ProgressSignal {
        if token.is_cancelled() {
            return ProgressSignal::Abort;
        }
        // Best-effort telemetry: drop updates when the applier lags
        let _ = progress_tx.try_send(progress::normalize(&event));
        ProgressSignal::Continue
    };

    let result = fetch_with_retry(&dl.config.retry, || {
        dl.fetcher.fetch(
            &task.request,
            workspace.dir(),
            &on_progress,
            task.token.clone(),
        )
    })
    .await;

    // Close the progress channel and let pending updates drain
    drop(on_progress);
    let _ = applier.await;

    // Checkpoint after the engine returns: a cancel during the transfer wins
    // even if the engine ignored the abort signal and finished the download.
    if task.token.is_cancelled() {
        mark_cancelled(dl, id).await;
        return;
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(FetchError::Cancelled) => {
            mark_cancelled(dl, id).await;
            return;
        }
        Err(e) => {
            mark_failed(dl, id, &e.to_string()).await;
            return;
        }
    };

    match transition(dl, id, Status::Processing).await {
        Transition::Applied => {}
        Transition::Refused | Transition::Gone => return,
    }

    let final_path = match finalize_artifact(dl, task, &info, &outcome.file_path).await {
        Ok(path) => path,
        Err(e) => {
            mark_failed(dl, id, &format!("failed to finalize artifact: {e}")).await;
            return;
        }
    };

    let mut completed = false;
    let found = dl
        .store
        .update(id, |record| {
            if let Some(size) = outcome.size_bytes {
                record.downloaded_bytes = Some(size);
                record.total_bytes = Some(size);
            }
            completed = record.complete(final_path.clone());
        })
        .await;
    if found && completed {
        tracing::info!(task_id = %id, path = %final_path.display(), "Download complete");
        dl.emit_event(Event::Completed {
            id: id.clone(),
            path: final_path,
        });
    } else {
        // A cancel or removal won the race after the move; the record will
        // never point at the artifact, so reclaim it.
        artifact::remove_file_quiet(&final_path).await;
    }
}

/// Move the fetched artifact from the workspace into the download directory.
///
/// The final name is `{sanitized title}_{task id}.{ext}`, which makes
/// collisions with other tasks' artifacts impossible in practice.
async fn finalize_artifact(
    dl: &MediaDownloader,
    task: &QueuedTask,
    info: &MediaInfo,
    artifact_path: &Path,
) -> std::io::Result<PathBuf> {
    let extension = artifact_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| task.request.format.extension().to_string());
    let file_name = format!(
        "{}_{}.{}",
        sanitize_filename(&info.title),
        task.id,
        extension
    );
    let dest = dl.config.download_dir.join(file_name);

    match tokio::fs::rename(artifact_path, &dest).await {
        Ok(()) => Ok(dest),
        Err(_) => {
            // Rename fails across filesystems; fall back to copy + remove
            tokio::fs::copy(artifact_path, &dest).await?;
            artifact::remove_file_quiet(artifact_path).await;
            Ok(dest)
        }
    }
}

/// Enforce configured size/duration limits against resolved metadata.
fn check_limits(limits: &LimitsConfig, info: &MediaInfo) -> Result<(), FetchError> {
    if let (Some(limit), Some(size)) = (limits.max_file_size_bytes, info.size_bytes)
        && size > limit
    {
        return Err(FetchError::TooLarge { size, limit });
    }
    if let (Some(limit), Some(duration)) = (limits.max_duration_secs, info.duration_secs)
        && duration > limit
    {
        return Err(FetchError::TooLong { duration, limit });
    }
    Ok(())
}

/// Apply a status transition through the store.
async fn transition(dl: &MediaDownloader, id: &TaskId, next: Status) -> Transition {
    let mut applied = false;
    let found = dl
        .store
        .update(id, |record| {
            applied = record.set_status(next);
        })
        .await;
    if !found {
        Transition::Gone
    } else if applied {
        Transition::Applied
    } else {
        Transition::Refused
    }
}

/// Mark a task failed and emit the event, unless it already reached a
/// terminal state.
async fn mark_failed(dl: &MediaDownloader, id: &TaskId, error: &str) {
    let mut applied = false;
    dl.store
        .update(id, |record| {
            applied = record.fail(error);
        })
        .await;
    if applied {
        tracing::error!(task_id = %id, error = %error, "Download failed");
        dl.emit_event(Event::Failed {
            id: id.clone(),
            error: error.to_string(),
        });
    }
}

/// Mark a task cancelled and emit the event, unless the facade already did
/// (the usual case — `cancel()` flips the status optimistically).
async fn mark_cancelled(dl: &MediaDownloader, id: &TaskId) {
    let mut applied = false;
    dl.store
        .update(id, |record| {
            applied = record.set_status(Status::Cancelled);
        })
        .await;
    if applied {
        tracing::info!(task_id = %id, "Download cancelled");
        dl.emit_event(Event::Cancelled { id: id.clone() });
    }
}

/// Spawn a task that applies normalized progress updates to the record and
/// re-emits them as events. Exits when the channel closes.
fn spawn_progress_applier(
    id: TaskId,
    dl: MediaDownloader,
    mut rx: mpsc::Receiver<ProgressUpdate>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            // Only a downloading task records progress; late updates queued
            // behind a cancel or failure must not touch the terminal record.
            let downloading = dl
                .store
                .get(&id)
                .await
                .is_some_and(|record| record.status == Status::Downloading);
            if !downloading {
                continue;
            }

            let mut snapshot = None;
            dl.store
                .update(&id, |record| {
                    if record.status == Status::Downloading {
                        record.apply_progress(&update);
                        snapshot = Some((
                            record.progress,
                            record.speed.clone(),
                            record.eta.clone(),
                        ));
                    }
                })
                .await;
            if let Some((percent, speed, eta)) = snapshot {
                dl.emit_event(Event::Downloading {
                    id: id.clone(),
                    percent,
                    speed,
                    eta,
                });
            }
        }
    })
}
