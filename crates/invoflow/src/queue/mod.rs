//! Durable work queue backed by the `queue_tasks` table.
//!
//! Delivery is at-least-once: a task whose lease expires before it is acked
//! becomes claimable again.

pub mod batch;
pub mod retry;
pub mod service;
pub mod task;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::db::{format_ts, queue_repo, Database, DatabaseError};

pub use batch::{BatchOutcome, BatchSummary};
pub use retry::RetryPolicy;
pub use service::JobQueueService;
pub use task::{QueueTask, TaskKind, TaskPayload, TaskStatus};

#[derive(Clone)]
pub struct JobQueue {
    db: Database,
    lease: Duration,
    notify: Arc<Notify>,
}

impl JobQueue {
    pub fn new(db: Database, lease: Duration) -> Self {
        Self {
            db,
            lease,
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Adds a task that is claimable immediately and wakes idle workers.
    pub fn enqueue(
        &self,
        kind: TaskKind,
        payload: &TaskPayload,
    ) -> Result<QueueTask, DatabaseError> {
        let task = queue_repo::insert(&self.db, kind, payload, &format_ts(Utc::now()))?;
        log::debug!("Enqueued {} task {} for file {}", kind, task.id, payload.file_id);
        self.notify.notify_waiters();
        Ok(task)
    }

    /// Leases the next due task of `kind`, if any.
    pub fn claim(&self, kind: TaskKind) -> Result<Option<QueueTask>, DatabaseError> {
        let now = Utc::now();
        let leased_until = later_by(now, self.lease);
        queue_repo::claim(&self.db, kind, &format_ts(now), &format_ts(leased_until))
    }

    pub fn ack(&self, task: &QueueTask) -> Result<(), DatabaseError> {
        if !queue_repo::ack(&self.db, &task.id, &format_ts(Utc::now()))? {
            log::warn!("Task {} was no longer leased when acked", task.id);
        }
        Ok(())
    }

    /// Re-queues a failed task to become due after `delay`.
    pub fn retry(
        &self,
        task: &QueueTask,
        delay: Duration,
        error: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let available_at = later_by(now, delay);
        if !queue_repo::requeue(
            &self.db,
            &task.id,
            &format_ts(available_at),
            error,
            &format_ts(now),
        )? {
            log::warn!("Task {} was no longer leased when re-queued", task.id);
        }
        Ok(())
    }

    pub fn dead_letter(&self, task: &QueueTask, error: &str) -> Result<(), DatabaseError> {
        if !queue_repo::dead_letter(&self.db, &task.id, error, &format_ts(Utc::now()))? {
            log::warn!("Task {} was no longer leased when dead-lettered", task.id);
        }
        Ok(())
    }

    /// Waits until something is enqueued or `timeout` passes.
    pub async fn wait_for_work(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    /// Wakes every idle worker, e.g. on shutdown.
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }
}

fn later_by(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        // keep four-digit years so stored timestamps still sort lexically
        .unwrap_or_else(|| now + chrono::Duration::days(36_500))
}
