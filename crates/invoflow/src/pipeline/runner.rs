use std::time::Duration;

use tracing::{error, info_span, warn, Instrument};

use super::context::PipelineContext;
use super::error::PipelineError;
use super::extract::ExtractStage;
use super::rename::RenameStage;
use super::stage::{Stage, StageOutcome};
use crate::queue::{QueueTask, RetryPolicy, TaskKind};
use crate::sanitize;

/// What happened to a claimed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDisposition {
    /// The stage finished; the task was acked.
    Done(StageOutcome),
    /// A transient error; the task is due again after `delay`.
    Retrying { delay: Duration, error: String },
    /// The task was dead-lettered and the file marked FAILED.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: String,
    pub kind: TaskKind,
    pub file_id: String,
    pub attempt: u32,
    pub disposition: TaskDisposition,
}

impl TaskResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.disposition, TaskDisposition::Failed { .. })
    }
}

/// Claims tasks, runs them through their stage and settles them against the
/// queue and the retry policy.
pub struct Pipeline {
    ctx: PipelineContext,
    retry: RetryPolicy,
    extract: ExtractStage,
    rename: RenameStage,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext, retry: RetryPolicy) -> Self {
        Self {
            extract: ExtractStage::new(ctx.clone()),
            rename: RenameStage::new(ctx.clone()),
            ctx,
            retry,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    fn stage(&self, kind: TaskKind) -> &dyn Stage {
        match kind {
            TaskKind::Extract => &self.extract,
            TaskKind::Rename => &self.rename,
        }
    }

    /// Claims and runs the next due task of `kind`. `None` when the queue
    /// has nothing due.
    pub async fn run_next(&self, kind: TaskKind) -> Result<Option<TaskResult>, PipelineError> {
        let Some(task) = self.ctx.queue().claim(kind)? else {
            return Ok(None);
        };
        Ok(Some(self.run_task(task).await))
    }

    /// Runs a leased task and settles it: ack on success, re-queue with
    /// backoff on a transient error with attempts left, otherwise
    /// dead-letter and fail the file.
    pub async fn run_task(&self, task: QueueTask) -> TaskResult {
        let payload = &task.payload;
        let key = sanitize::redact_key(&payload.file_key);
        let span = match task.kind {
            TaskKind::Extract => info_span!(
                "extract",
                task_id = %task.id,
                file_id = %payload.file_id,
                folder_id = %payload.folder_id,
                batch_id = %payload.batch_id,
                key = %key,
                attempt = task.attempts,
            ),
            TaskKind::Rename => info_span!(
                "rename",
                task_id = %task.id,
                file_id = %payload.file_id,
                folder_id = %payload.folder_id,
                batch_id = %payload.batch_id,
                key = %key,
                attempt = task.attempts,
            ),
        };

        let disposition = self.settle(&task).instrument(span).await;
        TaskResult {
            task_id: task.id.clone(),
            kind: task.kind,
            file_id: task.payload.file_id.clone(),
            attempt: task.attempts,
            disposition,
        }
    }

    async fn settle(&self, task: &QueueTask) -> TaskDisposition {
        let queue = self.ctx.queue();
        let err = match self.stage(task.kind).process(task).await {
            Ok(outcome) => {
                if let Err(e) = queue.ack(task) {
                    error!(error = %e, "Failed to ack task");
                }
                return TaskDisposition::Done(outcome);
            }
            Err(err) => err,
        };

        let message = err.to_string();
        if err.is_transient() && self.retry.should_retry(task.attempts) {
            let delay = self.retry.delay_for(task.attempts);
            warn!(error = %message, delay_ms = delay.as_millis() as u64, "Task failed, retrying");
            if let Err(e) = queue.retry(task, delay, &message) {
                error!(error = %e, "Failed to re-queue task");
            }
            return TaskDisposition::Retrying {
                delay,
                error: message,
            };
        }

        error!(error = %message, transient = err.is_transient(), "Task failed");
        if let Err(e) = queue.dead_letter(task, &message) {
            error!(error = %e, "Failed to dead-letter task");
        }
        self.ctx.fail_file(&task.payload, &message).await;
        TaskDisposition::Failed { error: message }
    }

    /// Runs due tasks of both kinds until neither queue has any left.
    /// Tasks re-queued with a delay are not waited for.
    pub async fn run_until_idle(&self) -> Result<Vec<TaskResult>, PipelineError> {
        let mut results = Vec::new();
        loop {
            let mut progressed = false;
            for kind in [TaskKind::Extract, TaskKind::Rename] {
                while let Some(result) = self.run_next(kind).await? {
                    progressed = true;
                    results.push(result);
                }
            }
            if !progressed {
                return Ok(results);
            }
        }
    }
}
