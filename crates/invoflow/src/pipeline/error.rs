use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::{AnalysisError, StorageError};

/// Why a stage could not finish a task.
///
/// Wrapped collaborator errors keep their own message, which is what ends up
/// in the file's `error` column.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),
}

impl PipelineError {
    /// Whether the task should be retried under the retry policy.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Analysis(e) => e.is_transient(),
            PipelineError::Storage(e) => e.is_transient(),
            PipelineError::Database(e) => e.is_transient(),
            PipelineError::FolderNotFound(_) => false,
        }
    }
}
