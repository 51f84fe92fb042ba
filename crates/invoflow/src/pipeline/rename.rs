//! Stage 2: validate the extracted invoice fields, rename the object and
//! complete the file.

use async_trait::async_trait;

use super::context::PipelineContext;
use super::error::PipelineError;
use super::naming::{compute_new_name, invoice_fields, MISSING_FIELDS_REASON};
use super::stage::{Stage, StageOutcome};
use crate::db::file_repo::RenamedObject;
use crate::db::{analysis_repo, file_repo, folder_repo};
use crate::error::StorageError;
use crate::model::{AnalysisRecord, FileRecord};
use crate::queue::{QueueTask, TaskKind};
use crate::storage::{move_object, rename_candidate, rename_destination, MAX_RENAME_SUFFIX};

pub struct RenameStage {
    ctx: PipelineContext,
}

impl RenameStage {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// The latest stored analysis, or a fresh one when none exists.
    async fn analysis_for(&self, file: &FileRecord) -> Result<AnalysisRecord, PipelineError> {
        if let Some(record) = analysis_repo::latest_for_file(self.ctx.db(), &file.id)? {
            return Ok(record);
        }
        tracing::info!("No stored analysis, analyzing again");
        let outcome = self.ctx.analyzer().analyze(&file.key).await?;
        Ok(analysis_repo::append(
            self.ctx.db(),
            &file.id,
            Some(&outcome.job_id),
            &outcome.field_sets,
        )?)
    }

    /// Moves the object to its final key and returns that key, or `None`
    /// when the file turned terminal before the move started.
    ///
    /// The destination is recorded before the move, so replaying an
    /// interrupted attempt finishes the same move.
    async fn move_to_final_key(
        &self,
        file: &FileRecord,
        new_name: &str,
    ) -> Result<Option<String>, PipelineError> {
        let db = self.ctx.db();
        let store = self.ctx.store();
        let target = match file_repo::rename_target(db, &file.id)? {
            Some(target) => {
                tracing::info!(
                    target = %crate::sanitize::redact_key(&target),
                    "Resuming interrupted rename"
                );
                target
            }
            None if !store.exists(&file.key).await? => {
                return match self.find_moved_object(file, new_name).await? {
                    Some(key) => Ok(Some(key)),
                    None => Err(StorageError::NotFound(file.key.clone()).into()),
                };
            }
            None => match rename_destination(store, &file.key, new_name).await? {
                Some(target) => {
                    if !file_repo::set_rename_target(db, &file.id, &target)? {
                        return Ok(None);
                    }
                    target
                }
                None => return Ok(Some(file.key.clone())),
            },
        };

        move_object(store, &file.key, &target).await?;
        Ok(Some(target))
    }

    /// Looks for the object of a rename that moved it without recording a
    /// destination: the first existing candidate key no file row claims.
    async fn find_moved_object(
        &self,
        file: &FileRecord,
        new_name: &str,
    ) -> Result<Option<String>, PipelineError> {
        for counter in 1..=MAX_RENAME_SUFFIX {
            let candidate = rename_candidate(&file.key, new_name, counter);
            if !self.ctx.store().exists(&candidate).await? {
                return Ok(None);
            }
            if !file_repo::key_in_use(self.ctx.db(), &candidate)? {
                tracing::warn!(
                    key = %crate::sanitize::redact_key(&candidate),
                    "Original object missing, adopting unclaimed rename destination"
                );
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Stage for RenameStage {
    fn kind(&self) -> TaskKind {
        TaskKind::Rename
    }

    async fn process(&self, task: &QueueTask) -> Result<StageOutcome, PipelineError> {
        let payload = &task.payload;
        let Some(file) = self.ctx.active_file(payload)? else {
            return Ok(StageOutcome::Skipped);
        };
        let tracker = self.ctx.tracker(payload);

        let record = self.analysis_for(&file).await?;
        let Some((invoice_id, invoice_date)) = invoice_fields(record.primary()) else {
            tracing::warn!(seq = record.seq, "Invoice id or date missing, not renaming");
            if file_repo::mark_failed_with_reason(self.ctx.db(), &file.id, MISSING_FIELDS_REASON)? {
                tracker.failed_with_reason(MISSING_FIELDS_REASON);
            }
            self.ctx.complete_batch(payload).await;
            return Ok(StageOutcome::Rejected);
        };

        let folder = folder_repo::find_by_id(self.ctx.db(), &file.folder_id)?
            .ok_or_else(|| PipelineError::FolderNotFound(file.folder_id.clone()))?;

        let renamed = match compute_new_name(folder.format, &invoice_id, &invoice_date) {
            Some(new_name) => {
                let Some(key) = self.move_to_final_key(&file, &new_name).await? else {
                    tracing::info!("File turned terminal before rename, skipping");
                    return Ok(StageOutcome::Skipped);
                };
                tracing::info!(
                    key = %crate::sanitize::redact_key(&key),
                    "Object renamed"
                );
                Some(RenamedObject {
                    url: self.ctx.store().public_url(&key),
                    key,
                    new_name,
                })
            }
            None => None,
        };

        if file_repo::complete(
            self.ctx.db(),
            &file.id,
            &invoice_id,
            &invoice_date,
            renamed.as_ref(),
        )? {
            tracker.completed(
                &invoice_id,
                &invoice_date,
                renamed.as_ref().map_or(file.key.as_str(), |r| r.key.as_str()),
                renamed.as_ref().map(|r| r.new_name.as_str()),
            );
        } else if let Some(moved) = renamed.as_ref().filter(|r| r.key != file.key) {
            // the object moved but COMPLETED lost the race; keep the row pointing at it
            if file_repo::relocate(self.ctx.db(), &file.id, &file.key, moved)? {
                tracing::warn!(
                    from = %crate::sanitize::redact_key(&file.key),
                    to = %crate::sanitize::redact_key(&moved.key),
                    "File turned terminal during rename, key updated"
                );
            } else {
                tracing::error!(
                    from = %crate::sanitize::redact_key(&file.key),
                    to = %crate::sanitize::redact_key(&moved.key),
                    "File turned terminal during rename and its key changed elsewhere"
                );
            }
        } else {
            tracing::warn!("File turned terminal during rename, COMPLETED not written");
        }

        self.ctx.complete_batch(payload).await;
        Ok(StageOutcome::Completed)
    }
}
