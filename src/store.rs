//! Thread-safe task table
//!
//! The store is the only structure mutated by multiple workers concurrently.
//! All access goes through its atomic operations; callers receive cloned
//! snapshots, never live references, and mutation closures run synchronously
//! under the lock so no worker holds record state across a suspension point.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::{Status, TaskId, TaskRecord};

/// Thread-safe table of task records keyed by id.
#[derive(Default)]
pub struct TaskStore {
    tasks: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl TaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record, failing if the id already exists.
    pub async fn insert(&self, record: TaskRecord) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&record.id) {
            return Err(Error::DuplicateId(record.id.to_string()));
        }
        tasks.insert(record.id.clone(), record);
        Ok(())
    }

    /// Get a snapshot of a record.
    pub async fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.tasks.lock().await.get(id).cloned()
    }

    /// Atomically apply a mutation to a record, stamping `updated_at`.
    ///
    /// Returns whether the record was found. The closure runs under the
    /// store lock and must not block.
    pub async fn update<F>(&self, id: &TaskId, mutate: F) -> bool
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut tasks = self.tasks.lock().await;
        match tasks.get_mut(id) {
            Some(record) => {
                mutate(record);
                record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Remove a record, returning it if present.
    pub async fn remove(&self, id: &TaskId) -> Option<TaskRecord> {
        self.tasks.lock().await.remove(id)
    }

    /// Remove every record in a terminal state, returning the removed ids.
    pub async fn remove_terminal(&self) -> Vec<TaskId> {
        let mut tasks = self.tasks.lock().await;
        let ids: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, record)| record.status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            tasks.remove(id);
        }
        ids
    }

    /// Snapshots of all records, ordered by creation time (oldest first).
    pub async fn list(&self) -> Vec<TaskRecord> {
        let tasks = self.tasks.lock().await;
        let mut records: Vec<TaskRecord> = tasks.values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    /// Count records whose status is in `statuses`.
    pub async fn count_by_status(&self, statuses: &[Status]) -> usize {
        let tasks = self.tasks.lock().await;
        tasks
            .values()
            .filter(|record| statuses.contains(&record.status))
            .count()
    }

    /// Number of tracked records.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}
