//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use invoflow::db::now_ts;
use invoflow::{FileRecord, FileStatus};
use serde_json::{json, Value};

/// Builder for config JSON documents, loaded through the real loader.
pub struct ConfigBuilder {
    value: Value,
}

impl ConfigBuilder {
    /// A minimal valid config.
    pub fn new() -> Self {
        Self {
            value: json!({
                "version": "1.0",
                "storage": { "root": "/tmp/invoflow-objects" },
                "analysis": { "endpoint": "http://127.0.0.1:9" }
            }),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.value["version"] = json!(version);
        self
    }

    pub fn worker_count(mut self, count: i64) -> Self {
        self.value["worker_count"] = json!(count);
        self
    }

    pub fn storage(mut self, key: &str, value: Value) -> Self {
        self.value["storage"][key] = value;
        self
    }

    pub fn analysis(mut self, key: &str, value: Value) -> Self {
        self.value["analysis"][key] = value;
        self
    }

    pub fn retry(mut self, key: &str, value: Value) -> Self {
        if self.value.get("queue").is_none() {
            self.value["queue"] = json!({ "retry": {} });
        }
        self.value["queue"]["retry"][key] = value;
        self
    }

    pub fn user(mut self, id: &str, email: &str) -> Self {
        if self.value.get("users").is_none() {
            self.value["users"] = json!([]);
        }
        if let Some(users) = self.value["users"].as_array_mut() {
            users.push(json!({ "id": id, "email": email }));
        }
        self
    }

    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.value[key] = value;
        self
    }

    pub fn build(self) -> String {
        self.value.to_string()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for file rows inserted directly into the store.
pub struct FileBuilder {
    file: FileRecord,
}

impl FileBuilder {
    pub fn new(id: &str, folder_id: &str) -> Self {
        let now = now_ts();
        Self {
            file: FileRecord {
                id: id.to_string(),
                folder_id: folder_id.to_string(),
                name: format!("{}.pdf", id),
                new_name: None,
                mime_type: Some("application/pdf".to_string()),
                size: 4,
                key: format!("uploads/{}/1700000000000-ab12cd34-{}.pdf", folder_id, id),
                url: None,
                status: FileStatus::Pending,
                batch_id: "b1".to_string(),
                invoice_id: String::new(),
                invoice_date: String::new(),
                reason: None,
                error: None,
                is_deleted: false,
                deleted_at: None,
                created_at: now.clone(),
                updated_at: now,
            },
        }
    }

    pub fn status(mut self, status: FileStatus) -> Self {
        self.file.status = status;
        self
    }

    pub fn batch(mut self, batch_id: &str) -> Self {
        self.file.batch_id = batch_id.to_string();
        self
    }

    pub fn deleted(mut self) -> Self {
        self.file.is_deleted = true;
        self.file.deleted_at = Some(now_ts());
        self
    }

    pub fn build(self) -> FileRecord {
        self.file
    }
}
