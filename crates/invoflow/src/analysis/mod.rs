//! Asynchronous expense analysis: submit a stored object, poll the job and
//! normalize the returned summary fields.

pub mod analyzer;
pub mod http;
pub mod normalize;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

pub use analyzer::{AnalysisOutcome, DocumentAnalyzer};
pub use http::HttpAnalysisService;
pub use normalize::{normalize_document, normalize_pages};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    #[serde(default)]
    pub job_id: Option<String>,
}

/// One status check. `pages` is only populated once the job succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub pages: Vec<AnalysisPage>,
    #[serde(default)]
    pub next_token: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPage {
    #[serde(default)]
    pub expense_documents: Vec<ExpenseDocument>,
}

/// One expense group found in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDocument {
    #[serde(default)]
    pub summary_fields: Vec<SummaryField>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryField {
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl SummaryField {
    pub fn new(field_type: &str, value: &str) -> Self {
        Self {
            field_type: Some(field_type.to_string()),
            value: Some(value.to_string()),
        }
    }
}

/// The external analysis API.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn start_analysis(&self, bucket: &str, key: &str)
        -> Result<StartResponse, AnalysisError>;

    async fn get_status(
        &self,
        job_id: &str,
        next_token: Option<&str>,
    ) -> Result<StatusResponse, AnalysisError>;
}
