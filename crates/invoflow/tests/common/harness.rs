//! Test harness for isolated pipeline runs.
//!
//! The `TestHarness` wires an in-memory database, an in-memory object store
//! and a mirror to a real pipeline. The analysis service and the notifier are
//! scripted so scenarios can be driven deterministically.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use invoflow::analysis::{
    AnalysisPage, ExpenseDocument, JobStatus, StartResponse, StatusResponse, SummaryField,
};
use invoflow::broadcast::BroadcastMirror;
use invoflow::db::{file_repo, folder_repo};
use invoflow::notify::{BatchCompletedEmail, Notifier, NotifyError, StaticUserDirectory};
use invoflow::pipeline::TaskResult;
use invoflow::upload::{UploadBatch, UploadFile};
use invoflow::{
    AnalysisError, AnalysisService, Database, DocumentAnalyzer, FileRecord, Folder, JobQueue,
    JobQueueService, MemoryObjectStore, Pipeline, PipelineContext, RenameFormat, RetryPolicy,
    UploadService,
};

pub const OWNER_ID: &str = "user-1";
pub const OWNER_EMAIL: &str = "ada@example.com";

/// One scripted status answer, consumed before the job succeeds.
#[derive(Debug, Clone)]
enum Step {
    InProgress,
    Transport(String),
}

#[derive(Debug, Clone, Default)]
struct Script {
    fields: Vec<SummaryField>,
    steps: VecDeque<Step>,
}

/// Analysis service driven by per-file scripts.
///
/// Scripts are keyed by the original upload name; stored keys end with
/// `-{name}`. Once a script's steps are used up the job succeeds with the
/// scripted fields, or with no fields when nothing was scripted.
#[derive(Default)]
pub struct ScriptedAnalysis {
    scripts: Mutex<HashMap<String, Script>>,
    jobs: Mutex<HashMap<String, String>>,
}

impl ScriptedAnalysis {
    pub fn fields(&self, name: &str, fields: &[(&str, &str)]) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(name.to_string()).or_default().fields =
            fields.iter().map(|(t, v)| SummaryField::new(t, v)).collect();
    }

    pub fn invoice(&self, name: &str, invoice_id: &str, date: &str) {
        self.fields(
            name,
            &[
                ("VENDOR_NAME", "ACME Corp"),
                ("INVOICE_RECEIPT_ID", invoice_id),
                ("INVOICE_RECEIPT_DATE", date),
            ],
        );
    }

    pub fn in_progress(&self, name: &str, times: usize) {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry(name.to_string()).or_default();
        script.steps.extend(std::iter::repeat(Step::InProgress).take(times));
    }

    pub fn transport_error(&self, name: &str, message: &str) {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry(name.to_string()).or_default();
        script.steps.push_back(Step::Transport(message.to_string()));
    }

    fn script_name(&self, key: &str) -> Option<String> {
        let scripts = self.scripts.lock().unwrap();
        let file_name = key.rsplit('/').next().unwrap_or(key);
        scripts
            .keys()
            .filter(|name| file_name == name.as_str() || file_name.ends_with(&format!("-{}", name)))
            .max_by_key(|name| name.len())
            .cloned()
    }
}

#[async_trait]
impl AnalysisService for ScriptedAnalysis {
    async fn start_analysis(&self, _bucket: &str, key: &str) -> Result<StartResponse, AnalysisError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job_id = format!("job-{}", jobs.len() + 1);
        jobs.insert(job_id.clone(), key.to_string());
        Ok(StartResponse {
            job_id: Some(job_id),
        })
    }

    async fn get_status(
        &self,
        job_id: &str,
        _next_token: Option<&str>,
    ) -> Result<StatusResponse, AnalysisError> {
        let key = self
            .jobs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| AnalysisError::Rejected(format!("unknown job {}", job_id)))?;

        let mut fields = Vec::new();
        if let Some(name) = self.script_name(&key) {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(name).or_default();
            match script.steps.pop_front() {
                Some(Step::InProgress) => {
                    return Ok(StatusResponse {
                        status: JobStatus::InProgress,
                        pages: vec![],
                        next_token: None,
                        status_message: None,
                    })
                }
                Some(Step::Transport(message)) => return Err(AnalysisError::Transport(message)),
                None => fields = script.fields.clone(),
            }
        }

        Ok(StatusResponse {
            status: JobStatus::Succeeded,
            pages: vec![AnalysisPage {
                expense_documents: vec![ExpenseDocument {
                    summary_fields: fields,
                }],
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

/// Complete in-memory pipeline.
pub struct TestHarness {
    pub db: Database,
    pub store: Arc<MemoryObjectStore>,
    pub mirror: BroadcastMirror,
    pub analysis: Arc<ScriptedAnalysis>,
    pub notifier: Arc<RecordingNotifier>,
    pub queue_service: JobQueueService,
    pub pipeline: Pipeline,
    pub uploads: UploadService,
}

impl TestHarness {
    /// Harness with three attempts per task and no backoff delay.
    pub fn new() -> Self {
        Self::with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            multiplier: 2,
            max_delay: Duration::ZERO,
        })
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        let store = Arc::new(MemoryObjectStore::new());
        let mirror = BroadcastMirror::new(256);
        let analysis = Arc::new(ScriptedAnalysis::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let queue_service = JobQueueService::new(
            JobQueue::new(db.clone(), Duration::from_secs(60)),
            Arc::new(mirror.clone()),
            Arc::new(StaticUserDirectory::new().with_user(OWNER_ID, OWNER_EMAIL, "Ada")),
            notifier.clone(),
        );
        let analyzer = DocumentAnalyzer::new(analysis.clone(), "invoflow", Duration::ZERO, 10);
        let ctx = PipelineContext::new(store.clone(), analyzer, queue_service.clone());
        let pipeline = Pipeline::new(ctx, retry);
        let uploads = UploadService::new(store.clone(), queue_service.clone(), "uploads");

        Self {
            db,
            store,
            mirror,
            analysis,
            notifier,
            queue_service,
            pipeline,
            uploads,
        }
    }

    pub fn folder(&self, format: RenameFormat) -> Folder {
        folder_repo::create(&self.db, OWNER_ID, "Q1 invoices", format)
            .expect("Failed to create folder")
    }

    /// Uploads one PDF per name into `folder` as a single batch.
    pub async fn upload(&self, folder: &Folder, names: &[&str]) -> UploadBatch {
        let files = names
            .iter()
            .map(|name| UploadFile::new(name, format!("%PDF {}", name).into_bytes()))
            .collect();
        self.uploads
            .upload_batch(&folder.id, files)
            .await
            .expect("Upload failed")
    }

    pub async fn run_until_idle(&self) -> Vec<TaskResult> {
        self.pipeline.run_until_idle().await.expect("Pipeline failed")
    }

    pub fn file(&self, id: &str) -> FileRecord {
        file_repo::find_by_id(&self.db, id)
            .expect("Failed to load file")
            .expect("File not found")
    }

    /// Current row of the batch file uploaded as `name`.
    pub fn file_named(&self, batch: &UploadBatch, name: &str) -> FileRecord {
        let uploaded = batch
            .files
            .iter()
            .find(|f| f.file.name == name)
            .expect("No such file in batch");
        self.file(&uploaded.file.id)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
