use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvoflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Notification error: {0}")]
    Notify(#[from] crate::notify::NotifyError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Duplicate user id '{0}' in config")]
    DuplicateUser(String),
}

/// Object store failures.
///
/// `Transient` is the only variant the queue retries; the others are
/// permanent for the task that hit them.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store misconfigured: {0}")]
    Configuration(String),

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Object store operation '{operation}' failed for '{key}': {message}")]
    Transient {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("No free destination key for '{0}'")]
    KeyExhausted(String),
}

impl StorageError {
    pub(crate) fn io(operation: &'static str, key: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Transient {
                operation,
                key: key.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient { .. })
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Analysis service did not return a job id for '{0}'")]
    MissingJobId(String),

    #[error("Analysis job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Analysis job {job_id} still in progress after {attempts} status checks")]
    PollTimeout { job_id: String, attempts: u32 },

    #[error("Analysis service request failed: {0}")]
    Transport(String),

    #[error("Analysis service rejected the request: {0}")]
    Rejected(String),

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),
}

impl AnalysisError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalysisError::Transport(_) | AnalysisError::PollTimeout { .. }
        )
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AnalysisError::MalformedResponse(err.to_string())
        } else {
            AnalysisError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to enqueue task for file {file_id}: {source}")]
    Enqueue {
        file_id: String,
        #[source]
        source: crate::db::DatabaseError,
    },

    #[error("Queue database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Unknown task kind '{0}'")]
    UnknownKind(String),
}

pub type Result<T> = std::result::Result<T, InvoflowError>;
