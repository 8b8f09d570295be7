//! Worker pool startup and shutdown coordination.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::queue::BoundedQueue;
use crate::types::Event;

use super::{MediaDownloader, RunningState};

impl MediaDownloader {
    /// Start the scheduler: allocate the bounded queue and spawn the worker pool.
    ///
    /// Calling `start` while already running is an error; call
    /// [`stop`](Self::stop) first. The scheduler may be started again after
    /// a stop.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.queue_state.running.lock().await;
        if running.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let worker_count = self.config.scheduler.max_concurrent_downloads;
        let queue = Arc::new(BoundedQueue::new(self.config.scheduler.max_queue_size));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let downloader = self.clone();
            workers.push(tokio::spawn(async move {
                super::worker::run_worker(worker_id, queue, downloader).await;
            }));
        }

        self.queue_state.accepting_new.store(true, Ordering::SeqCst);
        *running = Some(RunningState { queue, workers });

        tracing::info!(
            workers = worker_count,
            queue_capacity = self.config.scheduler.max_queue_size,
            "Scheduler started"
        );
        Ok(())
    }

    /// Stop the scheduler gracefully.
    ///
    /// Best-effort graceful shutdown, not guaranteed to cancel in-flight
    /// I/O: every non-terminal task's cancellation token is triggered, the
    /// queue is shut down so workers drain remaining items (marking them
    /// `Cancelled`), and worker exit is awaited up to the configured
    /// `shutdown_timeout`. Engine calls that ignore cancellation are left to
    /// finish on their own.
    pub async fn stop(&self) -> Result<()> {
        let state = {
            let mut running = self.queue_state.running.lock().await;
            running.take().ok_or(Error::NotRunning)?
        };

        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new downloads
        self.queue_state
            .accepting_new
            .store(false, Ordering::SeqCst);

        // 2. Request cancellation of everything in flight
        {
            let tokens = self.queue_state.cancel_tokens.lock().await;
            for token in tokens.values() {
                token.cancel();
            }
            tracing::debug!(count = tokens.len(), "Signaled cancellation to all tasks");
        }

        // 3. Wake blocked workers; they drain remaining queued items as cancelled
        state.queue.shutdown();

        // 4. Wait for worker loops to exit, with a bounded timeout
        let drain = futures::future::join_all(state.workers);
        match tokio::time::timeout(self.config.scheduler.shutdown_timeout, drain).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Worker task panicked during shutdown");
                    }
                }
                tracing::info!("All workers drained");
            }
            Err(_) => {
                tracing::warn!("Timeout waiting for workers to drain, proceeding with shutdown");
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether the worker pool is currently running.
    pub async fn is_running(&self) -> bool {
        self.queue_state.running.lock().await.is_some()
    }
}
