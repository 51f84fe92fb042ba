use async_trait::async_trait;

use super::error::PipelineError;
use crate::queue::{QueueTask, TaskKind};

/// How a stage finished a task it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Extraction finished and the rename task was queued.
    Advanced,
    /// The file reached COMPLETED.
    Completed,
    /// The file was marked FAILED by validation, not by an error.
    Rejected,
    /// Nothing to do: the file is missing, deleted or already terminal.
    Skipped,
}

/// One step of the pipeline, fed by tasks of a single kind.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn process(&self, task: &QueueTask) -> Result<StageOutcome, PipelineError>;
}
