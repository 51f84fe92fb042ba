use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pipeline stage a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Extract,
    Rename,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Extract => "extract",
            TaskKind::Rename => "rename",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "extract" => Some(TaskKind::Extract),
            "rename" => Some(TaskKind::Rename),
            _ => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Leased,
    Done,
    /// Retries exhausted. Kept for inspection, never claimed again.
    Dead,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Leased => "leased",
            TaskStatus::Done => "done",
            TaskStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(TaskStatus::Queued),
            "leased" => Some(TaskStatus::Leased),
            "done" => Some(TaskStatus::Done),
            "dead" => Some(TaskStatus::Dead),
            _ => None,
        }
    }
}

/// What a worker needs to know to process a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub file_key: String,
    pub folder_id: String,
    pub file_id: String,
    pub batch_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTask {
    pub id: String,
    pub kind: TaskKind,
    pub payload: TaskPayload,
    pub status: TaskStatus,
    /// Number of times the task has been claimed, including the current one.
    pub attempts: u32,
    pub available_at: String,
    pub leased_until: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
