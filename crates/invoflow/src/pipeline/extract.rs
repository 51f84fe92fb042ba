//! Stage 1: analyze the uploaded object and queue the rename.

use async_trait::async_trait;

use super::context::PipelineContext;
use super::error::PipelineError;
use super::stage::{Stage, StageOutcome};
use crate::db::{analysis_repo, file_repo};
use crate::model::FileStatus;
use crate::queue::{QueueTask, TaskKind};

pub struct ExtractStage {
    ctx: PipelineContext,
}

impl ExtractStage {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage for ExtractStage {
    fn kind(&self) -> TaskKind {
        TaskKind::Extract
    }

    async fn process(&self, task: &QueueTask) -> Result<StageOutcome, PipelineError> {
        let payload = &task.payload;
        let Some(file) = self.ctx.active_file(payload)? else {
            return Ok(StageOutcome::Skipped);
        };
        let tracker = self.ctx.tracker(payload);

        // recovery may replay a task whose file never left PENDING
        if file.status == FileStatus::Pending && file_repo::mark_processing(self.ctx.db(), &file.id)? {
            tracker.status(FileStatus::Processing);
        }

        let outcome = self.ctx.analyzer().analyze(&file.key).await?;
        let record = analysis_repo::append(
            self.ctx.db(),
            &file.id,
            Some(&outcome.job_id),
            &outcome.field_sets,
        )?;
        tracker.analyzed(record.field_sets.len());
        tracing::info!(
            seq = record.seq,
            field_sets = record.field_sets.len(),
            "Analysis recorded"
        );

        let rename = self.ctx.queue().enqueue(TaskKind::Rename, payload)?;
        tracing::debug!(task_id = %rename.id, "Rename queued");
        Ok(StageOutcome::Advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::queue_repo;
    use crate::error::AnalysisError;
    use crate::pipeline::test_support::Fixture;

    #[tokio::test]
    async fn test_extract_appends_record_and_queues_rename() {
        let fx = Fixture::new();
        let file = fx.insert_file("a", FileStatus::Processing);
        fx.analysis.set_fields(&file.key, &[("INVOICE_RECEIPT_ID", "INV-1")]);

        let stage = ExtractStage::new(fx.ctx.clone());
        let outcome = stage.process(&fx.task(&file, TaskKind::Extract)).await.unwrap();
        assert_eq!(outcome, StageOutcome::Advanced);

        let records = analysis_repo::list_for_file(&fx.db, "a").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field_sets[0].invoice_receipt_id, "INV-1");

        let tasks = queue_repo::list_for_file(&fx.db, "a").unwrap();
        assert!(tasks.iter().any(|t| t.kind == TaskKind::Rename));

        let stored = file_repo::find_by_id(&fx.db, "a").unwrap().unwrap();
        assert_eq!(stored.status, FileStatus::Processing);
        assert_eq!(fx.mirror_node(&file)["fieldSets"], 1);
    }

    #[tokio::test]
    async fn test_replay_appends_instead_of_replacing() {
        let fx = Fixture::new();
        let file = fx.insert_file("a", FileStatus::Processing);
        fx.analysis.set_fields(&file.key, &[("INVOICE_RECEIPT_ID", "INV-1")]);
        let stage = ExtractStage::new(fx.ctx.clone());
        let task = fx.task(&file, TaskKind::Extract);

        stage.process(&task).await.unwrap();
        fx.analysis.set_fields(&file.key, &[("INVOICE_RECEIPT_ID", "INV-2")]);
        stage.process(&task).await.unwrap();

        let records = analysis_repo::list_for_file(&fx.db, "a").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field_sets[0].invoice_receipt_id, "INV-1");
        assert_eq!(records[1].field_sets[0].invoice_receipt_id, "INV-2");
    }

    #[tokio::test]
    async fn test_pending_file_is_moved_to_processing() {
        let fx = Fixture::new();
        let file = fx.insert_file("a", FileStatus::Pending);
        let stage = ExtractStage::new(fx.ctx.clone());
        stage.process(&fx.task(&file, TaskKind::Extract)).await.unwrap();

        let stored = file_repo::find_by_id(&fx.db, "a").unwrap().unwrap();
        assert_eq!(stored.status, FileStatus::Processing);
    }

    #[tokio::test]
    async fn test_skips_terminal_deleted_and_missing_files() {
        let fx = Fixture::new();
        let done = fx.insert_file("done", FileStatus::Completed);
        let deleted = fx.insert_file("deleted", FileStatus::Processing);
        file_repo::soft_delete(&fx.db, "deleted").unwrap();
        let mut missing = fx.insert_file("missing", FileStatus::Processing);
        missing.id = "not-in-db".to_string();

        let stage = ExtractStage::new(fx.ctx.clone());
        for file in [&done, &deleted, &missing] {
            let outcome = stage.process(&fx.task(file, TaskKind::Extract)).await.unwrap();
            assert_eq!(outcome, StageOutcome::Skipped);
        }
        assert_eq!(fx.analysis.started(), 0);
    }

    #[tokio::test]
    async fn test_analysis_error_is_returned() {
        let fx = Fixture::new();
        let file = fx.insert_file("a", FileStatus::Processing);
        fx.analysis.fail_next(AnalysisError::JobFailed {
            job_id: "job-1".into(),
            message: "unreadable".into(),
        });

        let stage = ExtractStage::new(fx.ctx.clone());
        let err = stage.process(&fx.task(&file, TaskKind::Extract)).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(analysis_repo::list_for_file(&fx.db, "a").unwrap().is_empty());
    }
}
