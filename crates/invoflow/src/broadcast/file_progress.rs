//! Per-file status updates written to the realtime mirror.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use super::mirror::{file_path, RealtimeMirror};
use crate::model::{FileRecord, FileStatus};

/// Tracks the mirrored state of a single file.
#[derive(Clone)]
pub struct FileProgressTracker {
    mirror: Arc<dyn RealtimeMirror>,
    path: String,
}

impl FileProgressTracker {
    pub fn new(mirror: Arc<dyn RealtimeMirror>, folder_id: &str, file_id: &str) -> Self {
        Self {
            mirror,
            path: file_path(folder_id, file_id),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Writes the full node for a freshly created file.
    pub fn created(&self, file: &FileRecord) {
        self.mirror.set(
            &self.path,
            json!({
                "status": file.status.as_str(),
                "name": file.name,
                "newName": file.new_name,
                "key": file.key,
                "batchId": file.batch_id,
                "reason": Value::Null,
                "error": Value::Null,
                "updatedAt": Utc::now().to_rfc3339(),
            }),
        );
    }

    pub fn status(&self, status: FileStatus) {
        self.patch(json!({ "status": status.as_str() }));
    }

    /// Records that an analysis attempt produced `field_sets` expense groups.
    pub fn analyzed(&self, field_sets: usize) {
        self.patch(json!({
            "status": FileStatus::Processing.as_str(),
            "fieldSets": field_sets,
        }));
    }

    pub fn completed(
        &self,
        invoice_id: &str,
        invoice_date: &str,
        key: &str,
        new_name: Option<&str>,
    ) {
        self.patch(json!({
            "status": FileStatus::Completed.as_str(),
            "invoiceId": invoice_id,
            "invoiceDate": invoice_date,
            "key": key,
            "newName": new_name,
        }));
    }

    pub fn failed_with_error(&self, error: &str) {
        self.patch(json!({
            "status": FileStatus::Failed.as_str(),
            "error": error,
        }));
    }

    pub fn failed_with_reason(&self, reason: &str) {
        self.patch(json!({
            "status": FileStatus::Failed.as_str(),
            "reason": reason,
        }));
    }

    fn patch(&self, mut partial: Value) {
        if let Value::Object(map) = &mut partial {
            map.insert("updatedAt".to_string(), json!(Utc::now().to_rfc3339()));
        }
        self.mirror.update(&self.path, partial);
    }
}
