//! Entry points into the queue: recovery, enqueueing new uploads and the
//! per-batch completion check.

use std::sync::Arc;

use tracing::{info_span, Instrument};

use super::{BatchOutcome, JobQueue, QueueTask, TaskKind, TaskPayload};
use crate::broadcast::{FileProgressTracker, RealtimeMirror};
use crate::db::{file_repo, folder_repo, Database};
use crate::error::{InvoflowError, QueueError, Result};
use crate::model::FileStatus;
use crate::notify::{BatchCompletedEmail, Notifier, UserDirectory};

#[derive(Clone)]
pub struct JobQueueService {
    db: Database,
    queue: JobQueue,
    mirror: Arc<dyn RealtimeMirror>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl JobQueueService {
    pub fn new(
        queue: JobQueue,
        mirror: Arc<dyn RealtimeMirror>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db: queue.database().clone(),
            queue,
            mirror,
            users,
            notifier,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn mirror(&self) -> Arc<dyn RealtimeMirror> {
        Arc::clone(&self.mirror)
    }

    /// Start-up recovery: queues every live file still marked PENDING.
    ///
    /// Returns how many files were queued. A crash between enqueueing and
    /// marking a file PROCESSING leaves it PENDING, so the next sweep queues
    /// it a second time; workers skip the duplicate once the file is
    /// terminal.
    pub fn discover_and_enqueue_pending(&self) -> Result<usize> {
        let pending = file_repo::list_pending(&self.db)?;
        tracing::info!(count = pending.len(), "Recovering pending files");

        let mut enqueued = 0;
        for file in pending {
            match self.add_file_to_queue(&file.key, &file.folder_id, &file.id, &file.batch_id) {
                Ok(_) => enqueued += 1,
                Err(e) => tracing::error!(file_id = %file.id, error = %e, "Failed to recover file"),
            }
        }
        Ok(enqueued)
    }

    /// Queues extraction for a freshly uploaded file and marks it PROCESSING.
    ///
    /// If the task cannot be stored the file is marked FAILED and the error is
    /// returned to the uploader. The stored object is left in place.
    pub fn add_file_to_queue(
        &self,
        file_key: &str,
        folder_id: &str,
        file_id: &str,
        batch_id: &str,
    ) -> std::result::Result<QueueTask, QueueError> {
        let _span = info_span!(
            "enqueue",
            file_id,
            folder_id,
            batch_id,
            key = %crate::sanitize::redact_key(file_key)
        )
        .entered();

        let tracker = FileProgressTracker::new(Arc::clone(&self.mirror), folder_id, file_id);
        let payload = TaskPayload {
            file_key: file_key.to_string(),
            folder_id: folder_id.to_string(),
            file_id: file_id.to_string(),
            batch_id: batch_id.to_string(),
        };

        let task = match self.queue.enqueue(TaskKind::Extract, &payload) {
            Ok(task) => task,
            Err(source) => {
                let message = format!("Failed to enqueue file for processing: {}", source);
                tracing::error!(error = %source, "Enqueue failed");
                if let Err(e) = file_repo::mark_failed_with_error(&self.db, file_id, &message) {
                    tracing::error!(error = %e, "Failed to mark file FAILED after enqueue error");
                }
                tracker.failed_with_error(&message);
                return Err(QueueError::Enqueue {
                    file_id: file_id.to_string(),
                    source,
                });
            }
        };

        match file_repo::mark_processing(&self.db, file_id) {
            Ok(true) => tracker.status(FileStatus::Processing),
            Ok(false) => tracing::debug!("File was not PENDING, status left unchanged"),
            // the task is stored, the worker will pick the file up regardless
            Err(e) => tracing::warn!(error = %e, "Failed to mark file PROCESSING"),
        }

        tracing::info!(task_id = %task.id, "File queued for extraction");
        Ok(task)
    }

    /// Notifies the folder owner once every file of the batch is terminal.
    ///
    /// Safe to call any number of times, concurrently: the notification is
    /// sent only by the caller whose insert into the sent-batches set took
    /// effect.
    pub async fn handle_batch_completion(
        &self,
        folder_id: &str,
        batch_id: &str,
    ) -> Result<BatchOutcome> {
        let span = info_span!("batch_completion", folder_id, batch_id);
        self.check_batch(folder_id, batch_id).instrument(span).await
    }

    async fn check_batch(&self, folder_id: &str, batch_id: &str) -> Result<BatchOutcome> {
        let folder = folder_repo::find_by_id(&self.db, folder_id)?
            .ok_or_else(|| InvoflowError::FolderNotFound(folder_id.to_string()))?;
        let summary = file_repo::batch_summary(&self.db, folder_id, batch_id)?;

        if summary.total == 0 || !summary.is_complete() {
            tracing::debug!(
                total = summary.total,
                processing = summary.processing,
                "Batch not complete yet"
            );
            return Ok(BatchOutcome::Pending(summary));
        }

        if !folder_repo::mark_batch_notified(&self.db, folder_id, batch_id)? {
            tracing::debug!("Batch already notified");
            return Ok(BatchOutcome::AlreadyNotified(summary));
        }

        tracing::info!(
            total = summary.total,
            completed = summary.completed,
            failed = summary.failed,
            "Batch complete"
        );

        let Some(owner) = self.users.find_by_id(&folder.owner_id).await else {
            tracing::warn!(owner_id = %folder.owner_id, "Folder owner not found, no email sent");
            return Ok(BatchOutcome::Notified(summary));
        };

        let email = BatchCompletedEmail {
            to_email: owner.email,
            user_name: owner.first_name,
            folder_name: folder.name,
            total_files: summary.total,
            completed_files: summary.completed,
            failed_files: summary.failed,
        };
        if let Err(e) = self.notifier.send_batch_completed(&email).await {
            tracing::warn!(error = %e, "Failed to send batch completed email");
        }

        Ok(BatchOutcome::Notified(summary))
    }
}
