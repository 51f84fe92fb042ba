pub mod analysis;
pub mod app;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod upload;
pub mod worker;

pub use analysis::{AnalysisService, DocumentAnalyzer, HttpAnalysisService};
pub use app::App;
pub use broadcast::{BroadcastMirror, ConnectionRegistry, NoopMirror, RealtimeMirror};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{
    AnalysisError, ConfigError, InvoflowError, QueueError, Result, StorageError,
};
pub use model::{AnalysisRecord, FileRecord, FileStatus, Folder, InvoiceMetadata, RenameFormat};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext, PipelineError};
pub use queue::{BatchOutcome, BatchSummary, JobQueue, JobQueueService, RetryPolicy};
pub use secrets::{SecretError, SecretSource};
pub use storage::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use upload::{UploadFile, UploadService};
pub use worker::WorkerPool;
