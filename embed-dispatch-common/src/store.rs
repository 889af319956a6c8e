//! Result store interface and an in-process implementation with TTL eviction.
//!
//! The store keeps one [`TaskRecord`] per task id. Non-terminal markers
//! (PENDING, STARTED) may move back and forth while a task is retried; a
//! terminal result is written once and never replaced.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::task::{TaskRecord, TaskResult, TaskStatus};

/// Errors from result store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Result store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of writing a terminal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The result is now the task's terminal result.
    Written,
    /// A terminal result already existed; the write was ignored.
    AlreadyTerminal,
}

/// Outcome of a worker claiming a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Task marked STARTED.
    Claimed,
    /// Task already finished; the delivery is a duplicate.
    AlreadyTerminal,
    /// A later attempt already owns the task; the delivery is a leftover copy.
    Stale,
}

/// Storage for task status markers and results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store implementation name, for logs.
    fn store_type(&self) -> &'static str;

    /// Check the store is reachable. Called once at startup.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Record a freshly submitted task as PENDING. No-op if a record exists.
    async fn mark_pending(&self, task_id: &str) -> Result<(), StoreError>;

    /// Remove a PENDING marker whose task was never enqueued.
    async fn discard(&self, task_id: &str) -> Result<(), StoreError>;

    /// Mark a task STARTED for the given attempt, unless it is already terminal
    /// or a later attempt has been recorded.
    async fn mark_started(&self, task_id: &str, attempt: u32) -> Result<ClaimOutcome, StoreError>;

    /// Move a STARTED task back to PENDING ahead of a retry. Never lowers the
    /// recorded attempt.
    async fn mark_requeued(&self, task_id: &str, attempt: u32) -> Result<ClaimOutcome, StoreError>;

    /// Write a terminal result. The first terminal write wins.
    async fn put(&self, result: TaskResult) -> Result<PutOutcome, StoreError>;

    /// Current record for a task, if any.
    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// Evict expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

struct Entry {
    record: TaskRecord,
    expires_at: Instant,
}

/// Result store held in process memory.
///
/// Every write refreshes the entry's time-to-live; expired entries are
/// invisible to reads and removed by [`ResultStore::purge_expired`].
pub struct MemoryResultStore {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl MemoryResultStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn fresh(&self, record: TaskRecord) -> Entry {
        Entry {
            record,
            expires_at: Instant::now() + self.ttl,
        }
    }

    /// Set a non-terminal status, refusing to touch terminal records.
    async fn transition(
        &self,
        task_id: &str,
        status: TaskStatus,
        attempt: u32,
    ) -> ClaimOutcome {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        match entries.get_mut(task_id) {
            Some(entry) if entry.expires_at > now && entry.record.is_terminal() => {
                ClaimOutcome::AlreadyTerminal
            }
            Some(entry) if entry.expires_at > now && attempt < entry.record.attempt => {
                tracing::debug!(
                    task_id = %task_id,
                    attempt,
                    current = entry.record.attempt,
                    "Ignoring stale attempt"
                );
                ClaimOutcome::Stale
            }
            Some(entry) if entry.expires_at > now => {
                entry.record.status = status;
                entry.record.attempt = attempt;
                entry.record.updated_at = Utc::now();
                entry.expires_at = now + self.ttl;
                ClaimOutcome::Claimed
            }
            _ => {
                let mut record = TaskRecord::pending(task_id);
                record.status = status;
                record.attempt = attempt;
                entries.insert(task_id.to_string(), self.fresh(record));
                ClaimOutcome::Claimed
            }
        }
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    fn store_type(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn mark_pending(&self, task_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let live = entries
            .get(task_id)
            .map(|entry| entry.expires_at > now)
            .unwrap_or(false);

        if !live {
            entries.insert(task_id.to_string(), self.fresh(TaskRecord::pending(task_id)));
        }
        Ok(())
    }

    async fn discard(&self, task_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(task_id) {
            if entry.record.status == TaskStatus::Pending {
                entries.remove(task_id);
            }
        }
        Ok(())
    }

    async fn mark_started(&self, task_id: &str, attempt: u32) -> Result<ClaimOutcome, StoreError> {
        Ok(self.transition(task_id, TaskStatus::Started, attempt).await)
    }

    async fn mark_requeued(&self, task_id: &str, attempt: u32) -> Result<ClaimOutcome, StoreError> {
        Ok(self.transition(task_id, TaskStatus::Pending, attempt).await)
    }

    async fn put(&self, result: TaskResult) -> Result<PutOutcome, StoreError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let attempt = match entries.get(&result.task_id) {
            Some(entry) if entry.expires_at > now && entry.record.is_terminal() => {
                tracing::debug!(
                    task_id = %result.task_id,
                    existing = %entry.record.status,
                    "Ignoring write over terminal result"
                );
                return Ok(PutOutcome::AlreadyTerminal);
            }
            Some(entry) if entry.expires_at > now => entry.record.attempt,
            _ => 0,
        };

        let record = TaskRecord {
            task_id: result.task_id.clone(),
            status: result.status,
            attempt,
            updated_at: result.completed_at,
            result: Some(result),
        };
        entries.insert(record.task_id.clone(), self.fresh(record));
        Ok(PutOutcome::Written)
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(task_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.record.clone()))
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }
}
