//! Public task operations — enqueue, query, cancel, remove, list, clear.

use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::artifact;
use crate::error::{Error, Result};
use crate::types::{DownloadRequest, Event, QueueStatus, Status, TaskId, TaskRecord};

use super::{MediaDownloader, QueuedTask};

impl MediaDownloader {
    /// Add a download to the queue.
    ///
    /// Validates the request, applies admission control against the bounded
    /// queue, creates the task record in `Queued` state, and returns its id.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a malformed request (no task state is created)
    /// - [`Error::QueueFull`] when the pending queue is at capacity
    /// - [`Error::NotRunning`] before `start()` / [`Error::ShuttingDown`] after `stop()`
    pub async fn add_download(&self, request: DownloadRequest) -> Result<TaskId> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        validate_request(&request)?;

        let queue = {
            let running = self.queue_state.running.lock().await;
            match running.as_ref() {
                Some(state) => state.queue.clone(),
                None => return Err(Error::NotRunning),
            }
        };

        let id = TaskId::generate();
        let token = CancellationToken::new();
        let record = TaskRecord::new(id.clone(), request.clone());

        // Register record and token before pushing so a worker that pops the
        // item immediately always finds them; roll back on rejection so an
        // admission failure leaves no partial state.
        self.store.insert(record).await?;
        {
            let mut tokens = self.queue_state.cancel_tokens.lock().await;
            tokens.insert(id.clone(), token.clone());
        }

        let queued = QueuedTask {
            id: id.clone(),
            request,
            token,
        };
        if let Err(e) = queue.push(queued).await {
            self.store.remove(&id).await;
            self.queue_state.cancel_tokens.lock().await.remove(&id);
            return Err(e);
        }

        tracing::info!(task_id = %id, "Download queued");
        self.emit_event(Event::Queued { id: id.clone() });
        Ok(id)
    }

    /// Get a snapshot of a task record.
    pub async fn get(&self, id: &TaskId) -> Result<TaskRecord> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Request cancellation of a task.
    ///
    /// Returns `Ok(true)` when cancellation was requested: the task's status
    /// flips to `Cancelled` immediately and its worker observes the token at
    /// the next checkpoint. The worker never reverts a `Cancelled` status.
    /// Returns `Ok(false)` when the task is already terminal.
    pub async fn cancel(&self, id: &TaskId) -> Result<bool> {
        // Flip the status in the same atomic update that checks terminality,
        // so a concurrent completion can never race a successful cancel.
        let mut cancelled = false;
        let found = self
            .store
            .update(id, |record| {
                cancelled = record.set_status(Status::Cancelled);
            })
            .await;
        if !found {
            return Err(Error::NotFound(id.to_string()));
        }
        if !cancelled {
            return Ok(false);
        }

        if let Some(token) = self.queue_state.cancel_tokens.lock().await.get(id) {
            token.cancel();
        }

        tracing::info!(task_id = %id, "Cancellation requested");
        self.emit_event(Event::Cancelled { id: id.clone() });
        Ok(true)
    }

    /// Remove a task, cascading to its on-disk state.
    ///
    /// Deletes the record and cancellation token, cancels the task if it is
    /// still running, and removes both the final artifact (if any) and the
    /// task workspace.
    pub async fn remove(&self, id: &TaskId) -> Result<()> {
        let record = self
            .store
            .remove(id)
            .await
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if let Some(token) = self.queue_state.cancel_tokens.lock().await.remove(id) {
            token.cancel();
        }

        if let Some(ref path) = record.file_path {
            artifact::remove_file_quiet(path).await;
        }
        artifact::remove_dir_quiet(&self.workspace_dir(id)).await;

        tracing::info!(task_id = %id, "Task removed");
        self.emit_event(Event::Removed { id: id.clone() });
        Ok(())
    }

    /// Remove every task in a terminal state, returning how many were removed.
    ///
    /// Records only — completed artifacts stay on disk for the embedding
    /// application to serve; abandoned workspaces are reclaimed by the
    /// stale-workspace janitor.
    pub async fn clear_completed(&self) -> usize {
        let removed = self.store.remove_terminal().await;
        {
            let mut tokens = self.queue_state.cancel_tokens.lock().await;
            for id in &removed {
                tokens.remove(id);
            }
        }
        tracing::info!(count = removed.len(), "Cleared finished tasks");
        removed.len()
    }

    /// Aggregate queue statistics from a single consistent store snapshot.
    pub async fn queue_status(&self) -> QueueStatus {
        let tasks = self.store.list().await;

        let mut status = QueueStatus {
            active: 0,
            queued: 0,
            completed: 0,
            failed: 0,
            tasks: Vec::new(),
        };
        for record in &tasks {
            match record.status {
                Status::Queued => status.queued += 1,
                Status::FetchingInfo | Status::Downloading | Status::Processing => {
                    status.active += 1
                }
                Status::Completed => status.completed += 1,
                Status::Failed | Status::Cancelled => status.failed += 1,
            }
        }
        status.tasks = tasks;
        status
    }
}

/// Validate an incoming request before any task state is created.
fn validate_request(request: &DownloadRequest) -> Result<()> {
    if request.url.trim().is_empty() {
        return Err(Error::validation_field("url must not be empty", "url"));
    }

    let parsed = Url::parse(&request.url)
        .map_err(|e| Error::validation_field(format!("invalid url: {e}"), "url"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::validation_field(
            format!("unsupported url scheme '{}'", parsed.scheme()),
            "url",
        ));
    }

    if let Some(ref items) = request.playlist_items {
        if items.is_empty() {
            return Err(Error::validation_field(
                "playlist_items must not be empty when present",
                "playlist_items",
            ));
        }
        if items.contains(&0) {
            return Err(Error::validation_field(
                "playlist item indices are 1-based",
                "playlist_items",
            ));
        }
    }

    Ok(())
}
