use std::sync::Arc;

use crate::analysis::DocumentAnalyzer;
use crate::broadcast::FileProgressTracker;
use crate::db::{file_repo, Database, DatabaseError};
use crate::model::FileRecord;
use crate::queue::{JobQueue, JobQueueService, TaskPayload};
use crate::storage::ObjectStore;

/// Collaborators shared by both stages and the runner.
#[derive(Clone)]
pub struct PipelineContext {
    db: Database,
    store: Arc<dyn ObjectStore>,
    analyzer: DocumentAnalyzer,
    queue_service: JobQueueService,
}

impl PipelineContext {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        analyzer: DocumentAnalyzer,
        queue_service: JobQueueService,
    ) -> Self {
        Self {
            db: queue_service.queue().database().clone(),
            store,
            analyzer,
            queue_service,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn analyzer(&self) -> &DocumentAnalyzer {
        &self.analyzer
    }

    pub fn queue(&self) -> &JobQueue {
        self.queue_service.queue()
    }

    pub fn queue_service(&self) -> &JobQueueService {
        &self.queue_service
    }

    pub fn tracker(&self, payload: &TaskPayload) -> FileProgressTracker {
        FileProgressTracker::new(
            self.queue_service.mirror(),
            &payload.folder_id,
            &payload.file_id,
        )
    }

    /// The task's file if it still needs work: present, not soft-deleted and
    /// not terminal.
    pub fn active_file(&self, payload: &TaskPayload) -> Result<Option<FileRecord>, DatabaseError> {
        let Some(file) = file_repo::find_by_id(&self.db, &payload.file_id)? else {
            tracing::info!("File no longer exists, skipping task");
            return Ok(None);
        };
        if file.is_deleted {
            tracing::info!("File was deleted, skipping task");
            return Ok(None);
        }
        if file.status.is_terminal() {
            tracing::info!(status = %file.status, "File already terminal, skipping task");
            return Ok(None);
        }
        Ok(Some(file))
    }

    /// Marks the file FAILED with `message` in both stores, then runs the
    /// batch completion check. Files that are already terminal keep their
    /// status.
    pub async fn fail_file(&self, payload: &TaskPayload, message: &str) {
        match file_repo::mark_failed_with_error(&self.db, &payload.file_id, message) {
            Ok(true) => self.tracker(payload).failed_with_error(message),
            Ok(false) => tracing::debug!("File already terminal, FAILED not written"),
            Err(e) => tracing::error!(error = %e, "Failed to mark file FAILED"),
        }
        self.complete_batch(payload).await;
    }

    /// Runs the batch completion check for the payload's batch. Errors are
    /// logged; they never fail the task.
    pub async fn complete_batch(&self, payload: &TaskPayload) {
        if let Err(e) = self
            .queue_service
            .handle_batch_completion(&payload.folder_id, &payload.batch_id)
            .await
        {
            tracing::error!(error = %e, "Batch completion check failed");
        }
    }
}
