//! Shared fixtures for the stage and runner tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::context::PipelineContext;
use crate::analysis::{
    AnalysisPage, AnalysisService, DocumentAnalyzer, ExpenseDocument, JobStatus, StartResponse,
    StatusResponse, SummaryField,
};
use crate::broadcast::{file_path, BroadcastMirror};
use crate::db::{file_repo, folder_repo, now_ts, Database};
use crate::error::AnalysisError;
use crate::model::{FileRecord, FileStatus, Folder, RenameFormat};
use crate::notify::{BatchCompletedEmail, Notifier, NotifyError, StaticUserDirectory};
use crate::queue::{JobQueue, JobQueueService, QueueTask, TaskKind, TaskPayload, TaskStatus};
use crate::storage::MemoryObjectStore;

/// Answers every job with the fields configured for its key. Errors queued
/// with `fail_next` are returned by the next status checks.
#[derive(Default)]
pub struct FakeAnalysis {
    fields: Mutex<HashMap<String, Vec<SummaryField>>>,
    jobs: Mutex<HashMap<String, String>>,
    errors: Mutex<VecDeque<AnalysisError>>,
    started: AtomicU32,
}

impl FakeAnalysis {
    pub fn set_fields(&self, key: &str, fields: &[(&str, &str)]) {
        let fields = fields.iter().map(|(t, v)| SummaryField::new(t, v)).collect();
        self.fields.lock().unwrap().insert(key.to_string(), fields);
    }

    pub fn fail_next(&self, error: AnalysisError) {
        self.errors.lock().unwrap().push_back(error);
    }

    pub fn started(&self) -> u32 {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisService for FakeAnalysis {
    async fn start_analysis(&self, _bucket: &str, key: &str) -> Result<StartResponse, AnalysisError> {
        let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = format!("job-{}", n);
        self.jobs.lock().unwrap().insert(job_id.clone(), key.to_string());
        Ok(StartResponse {
            job_id: Some(job_id),
        })
    }

    async fn get_status(
        &self,
        job_id: &str,
        _next_token: Option<&str>,
    ) -> Result<StatusResponse, AnalysisError> {
        if let Some(error) = self.errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let key = self.jobs.lock().unwrap().get(job_id).cloned().unwrap_or_default();
        let summary_fields = self.fields.lock().unwrap().get(&key).cloned().unwrap_or_default();
        Ok(StatusResponse {
            status: JobStatus::Succeeded,
            pages: vec![AnalysisPage {
                expense_documents: vec![ExpenseDocument { summary_fields }],
            }],
            next_token: None,
            status_message: None,
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<BatchCompletedEmail>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<BatchCompletedEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_batch_completed(&self, email: &BatchCompletedEmail) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct Fixture {
    pub db: Database,
    pub store: Arc<MemoryObjectStore>,
    pub mirror: BroadcastMirror,
    pub analysis: Arc<FakeAnalysis>,
    pub notifier: Arc<RecordingNotifier>,
    pub folder: Folder,
    pub ctx: PipelineContext,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_format(RenameFormat::InvoiceDate)
    }

    pub fn with_format(format: RenameFormat) -> Self {
        let db = Database::open_in_memory().unwrap();
        let folder = folder_repo::create(&db, "user-1", "Q1", format).unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let mirror = BroadcastMirror::new(64);
        let analysis = Arc::new(FakeAnalysis::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let queue_service = JobQueueService::new(
            JobQueue::new(db.clone(), Duration::from_secs(60)),
            Arc::new(mirror.clone()),
            Arc::new(StaticUserDirectory::new().with_user("user-1", "ada@example.com", "Ada")),
            notifier.clone(),
        );
        let analyzer = DocumentAnalyzer::new(analysis.clone(), "bucket", Duration::ZERO, 3);
        let ctx = PipelineContext::new(store.clone(), analyzer, queue_service);

        Self {
            db,
            store,
            mirror,
            analysis,
            notifier,
            folder,
            ctx,
        }
    }

    /// Inserts a file row with `status` and stores its object.
    pub fn insert_file(&self, id: &str, status: FileStatus) -> FileRecord {
        let now = now_ts();
        let key = format!("uploads/{}/1700000000000-ab12cd34-{}.pdf", self.folder.id, id);
        let file = FileRecord {
            id: id.to_string(),
            folder_id: self.folder.id.clone(),
            name: format!("{}.pdf", id),
            new_name: None,
            mime_type: Some("application/pdf".to_string()),
            size: 3,
            key: key.clone(),
            url: None,
            status,
            batch_id: "b1".to_string(),
            invoice_id: String::new(),
            invoice_date: String::new(),
            reason: None,
            error: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        file_repo::insert(&self.db, &file).unwrap();
        self.store.put(&key, b"pdf".to_vec());
        file
    }

    /// Inserts a PENDING file and queues it the way an upload does.
    pub fn upload(&self, id: &str) -> FileRecord {
        let file = self.insert_file(id, FileStatus::Pending);
        self.ctx
            .queue_service()
            .add_file_to_queue(&file.key, &file.folder_id, &file.id, &file.batch_id)
            .unwrap();
        file_repo::find_by_id(&self.db, id).unwrap().unwrap()
    }

    /// A leased task for `file` that is not stored in the queue.
    pub fn task(&self, file: &FileRecord, kind: TaskKind) -> QueueTask {
        let now = now_ts();
        QueueTask {
            id: format!("task-{}", file.id),
            kind,
            payload: TaskPayload {
                file_key: file.key.clone(),
                folder_id: file.folder_id.clone(),
                file_id: file.id.clone(),
                batch_id: file.batch_id.clone(),
            },
            status: TaskStatus::Leased,
            attempts: 1,
            available_at: now.clone(),
            leased_until: Some(now.clone()),
            last_error: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn mirror_node(&self, file: &FileRecord) -> Value {
        self.mirror
            .get(&file_path(&file.folder_id, &file.id))
            .unwrap_or(Value::Null)
    }
}
