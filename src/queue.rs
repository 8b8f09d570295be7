//! Bounded admission queue for pending download requests
//!
//! Admission is a synchronous check: a caller holding an HTTP connection
//! must fail fast when the queue is at capacity rather than block. Workers
//! on the consuming side suspend in [`BoundedQueue::pop`] until work arrives
//! or the queue is shut down.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A FIFO queue with fixed capacity and fail-fast admission.
///
/// - `push` never blocks: it fails with [`Error::QueueFull`] at capacity and
///   [`Error::QueueClosed`] after shutdown.
/// - `pop` suspends until an item is available; after shutdown it drains the
///   remaining items and then resolves to `None` for every caller.
/// - FIFO order is guaranteed for admission, not completion — consumers race
///   independently once items leave the queue.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    shutdown: CancellationToken,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` pending items.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            shutdown: CancellationToken::new(),
            capacity,
        }
    }

    /// Enqueue an item, failing fast when full or shut down.
    pub async fn push(&self, item: T) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::QueueClosed);
        }
        {
            let mut items = self.items.lock().await;
            if items.len() >= self.capacity {
                return Err(Error::QueueFull {
                    capacity: self.capacity,
                });
            }
            items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Dequeue the next item, suspending until one is available.
    ///
    /// Returns `None` once the queue has been shut down and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            // Register interest before re-checking so a push between the
            // check and the await cannot be lost.
            let notified = self.notify.notified();
            {
                let mut items = self.items.lock().await;
                if let Some(item) = items.pop_front() {
                    return Some(item);
                }
            }
            if self.shutdown.is_cancelled() {
                return None;
            }
            tokio::select! {
                _ = notified => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
    }

    /// Shut the queue down, waking every suspended `pop` exactly once.
    ///
    /// Already-queued items remain poppable so consumers can drain them;
    /// subsequent `push` calls fail with [`Error::QueueClosed`]. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.notify.notify_waiters();
    }

    /// Number of items currently waiting.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Whether the queue currently holds no items.
    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Whether `shutdown` has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
