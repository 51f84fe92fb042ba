//! Upload entry point: store the bytes, record the files and queue them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info_span, Instrument};

use crate::broadcast::FileProgressTracker;
use crate::db::{file_repo, folder_repo, now_ts, Database};
use crate::error::{InvoflowError, Result, StorageError};
use crate::model::{FileRecord, FileStatus};
use crate::queue::JobQueueService;
use crate::storage::{generate_unique_key, ObjectStore, UploadOptions};

/// One file handed in by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Guessed from the name when absent.
    pub content_type: Option<String>,
}

impl UploadFile {
    pub fn new(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            bytes,
            content_type: None,
        }
    }

    pub async fn from_path(path: &Path) -> std::result::Result<Self, StorageError> {
        let key = path.display().to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::io("read", &key, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(key);
        Ok(Self::new(&name, bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file: FileRecord,
    /// Id of the extraction task, if it could be queued.
    pub task_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBatch {
    pub batch_id: String,
    pub files: Vec<UploadedFile>,
}

impl UploadBatch {
    pub fn queued(&self) -> usize {
        self.files.iter().filter(|f| f.task_id.is_some()).count()
    }
}

#[derive(Clone)]
pub struct UploadService {
    db: Database,
    store: Arc<dyn ObjectStore>,
    queue_service: JobQueueService,
    key_prefix: String,
}

impl UploadService {
    pub fn new(store: Arc<dyn ObjectStore>, queue_service: JobQueueService, key_prefix: &str) -> Self {
        Self {
            db: queue_service.queue().database().clone(),
            store,
            queue_service,
            key_prefix: key_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Uploads `files` into `folder_id` as one batch.
    ///
    /// A storage or database error stops the upload and is returned, after
    /// the files stored before it have been queued. A file that cannot be
    /// queued is marked FAILED and reported in its [`UploadedFile::error`];
    /// the rest of the batch carries on.
    pub async fn upload_batch(&self, folder_id: &str, files: Vec<UploadFile>) -> Result<UploadBatch> {
        if folder_repo::find_by_id(&self.db, folder_id)?.is_none() {
            return Err(InvoflowError::FolderNotFound(folder_id.to_string()));
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let prefix = format!("{}/{}", self.key_prefix, folder_id);

        // every row exists before the first task is queued, so the batch
        // cannot look complete while later files are still being stored
        let mut records = Vec::with_capacity(files.len());
        let mut aborted = None;
        for upload in files {
            let key = generate_unique_key(&upload.name, &prefix);
            let span = info_span!("upload", key = %crate::sanitize::redact_key(&key));
            match self
                .store_file(folder_id, &batch_id, key, upload)
                .instrument(span)
                .await
            {
                Ok(record) => records.push(record),
                Err(e) => {
                    aborted = Some(e);
                    break;
                }
            }
        }

        let uploaded = self.enqueue_stored(folder_id, &batch_id, records)?;
        let batch = UploadBatch {
            batch_id,
            files: uploaded,
        };

        // files that failed to queue may already complete the batch
        if batch.queued() < batch.files.len() {
            if let Err(e) = self
                .queue_service
                .handle_batch_completion(folder_id, &batch.batch_id)
                .await
            {
                tracing::error!(error = %e, "Batch completion check failed");
            }
        }

        if let Some(e) = aborted {
            tracing::error!(
                folder_id,
                batch_id = %batch.batch_id,
                stored = batch.files.len(),
                queued = batch.queued(),
                error = %e,
                "Upload aborted, stored files were queued"
            );
            return Err(e);
        }

        tracing::info!(
            folder_id,
            batch_id = %batch.batch_id,
            files = batch.files.len(),
            queued = batch.queued(),
            "Upload batch accepted"
        );
        Ok(batch)
    }

    fn enqueue_stored(
        &self,
        folder_id: &str,
        batch_id: &str,
        records: Vec<FileRecord>,
    ) -> Result<Vec<UploadedFile>> {
        let mut uploaded = Vec::with_capacity(records.len());
        for record in records {
            let queued = self
                .queue_service
                .add_file_to_queue(&record.key, folder_id, &record.id, batch_id);
            let (task_id, error) = match queued {
                Ok(task) => (Some(task.id), None),
                Err(e) => (None, Some(e.to_string())),
            };
            let file = file_repo::find_by_id(&self.db, &record.id)?.unwrap_or(record);
            uploaded.push(UploadedFile {
                file,
                task_id,
                error,
            });
        }
        Ok(uploaded)
    }

    async fn store_file(
        &self,
        folder_id: &str,
        batch_id: &str,
        key: String,
        upload: UploadFile,
    ) -> Result<FileRecord> {
        let content_type = upload.content_type.clone().or_else(|| {
            mime_guess::from_path(&upload.name)
                .first()
                .map(|m| m.essence_str().to_string())
        });
        let size = upload.bytes.len() as u64;
        let options = UploadOptions {
            content_type: content_type.clone(),
            metadata: HashMap::from([("originalName".to_string(), upload.name.clone())]),
            ..Default::default()
        };
        let stored = self.store.upload(&key, upload.bytes, &options).await?;

        let now = now_ts();
        let record = FileRecord {
            id: uuid::Uuid::new_v4().to_string(),
            folder_id: folder_id.to_string(),
            name: upload.name,
            new_name: None,
            mime_type: content_type,
            size,
            key: stored.key,
            url: stored.location,
            status: FileStatus::Pending,
            batch_id: batch_id.to_string(),
            invoice_id: String::new(),
            invoice_date: String::new(),
            reason: None,
            error: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        file_repo::insert(&self.db, &record)?;
        FileProgressTracker::new(self.queue_service.mirror(), folder_id, &record.id).created(&record);
        Ok(record)
    }
}
