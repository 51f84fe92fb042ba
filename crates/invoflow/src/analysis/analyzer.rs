use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::normalize::normalize_pages;
use super::{AnalysisPage, AnalysisService, JobStatus};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::model::InvoiceMetadata;

/// Result of a full start-poll-normalize run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    pub job_id: String,
    pub field_sets: Vec<InvoiceMetadata>,
}

/// Submit-and-poll wrapper over an [`AnalysisService`].
#[derive(Clone)]
pub struct DocumentAnalyzer {
    service: Arc<dyn AnalysisService>,
    bucket: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl DocumentAnalyzer {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        bucket: &str,
        poll_interval: Duration,
        max_poll_attempts: u32,
    ) -> Self {
        Self {
            service,
            bucket: bucket.to_string(),
            poll_interval,
            max_poll_attempts: max_poll_attempts.max(1),
        }
    }

    pub fn from_config(service: Arc<dyn AnalysisService>, bucket: &str, config: &AnalysisConfig) -> Self {
        Self::new(
            service,
            bucket,
            Duration::from_secs(config.poll_interval_secs),
            config.max_poll_attempts,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Submits `key` for analysis and returns the job id.
    pub async fn start_analysis(&self, key: &str) -> Result<String, AnalysisError> {
        let response = self.service.start_analysis(&self.bucket, key).await?;
        match response.job_id.filter(|id| !id.is_empty()) {
            Some(job_id) => {
                debug!(job_id = %job_id, "Analysis job started");
                Ok(job_id)
            }
            None => Err(AnalysisError::MissingJobId(key.to_string())),
        }
    }

    /// Polls until the job leaves `IN_PROGRESS`, then collects every result
    /// page by following `next_token`.
    ///
    /// Gives up with [`AnalysisError::PollTimeout`] after
    /// `max_poll_attempts` in-progress answers.
    pub async fn poll_until_done(&self, job_id: &str) -> Result<Vec<AnalysisPage>, AnalysisError> {
        let mut attempts = 0u32;
        let first = loop {
            attempts += 1;
            let response = self.service.get_status(job_id, None).await?;
            match response.status {
                JobStatus::Succeeded => break response,
                JobStatus::Failed => {
                    return Err(AnalysisError::JobFailed {
                        job_id: job_id.to_string(),
                        message: response
                            .status_message
                            .unwrap_or_else(|| "no status message".to_string()),
                    });
                }
                JobStatus::InProgress => {
                    if attempts >= self.max_poll_attempts {
                        return Err(AnalysisError::PollTimeout {
                            job_id: job_id.to_string(),
                            attempts,
                        });
                    }
                    debug!(job_id, attempts, "Analysis still in progress");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        };

        let mut pages = first.pages;
        let mut seen_tokens = HashSet::new();
        let mut next_token = first.next_token;
        while let Some(token) = next_token {
            if !seen_tokens.insert(token.clone()) {
                return Err(AnalysisError::MalformedResponse(format!(
                    "pagination token '{}' repeated for job {}",
                    token, job_id
                )));
            }
            let response = self.service.get_status(job_id, Some(&token)).await?;
            pages.extend(response.pages);
            next_token = response.next_token;
        }

        Ok(pages)
    }

    /// Runs a full analysis of `key` and returns one field set per expense
    /// group.
    pub async fn analyze(&self, key: &str) -> Result<AnalysisOutcome, AnalysisError> {
        let job_id = self.start_analysis(key).await?;
        let pages = self.poll_until_done(&job_id).await?;
        let field_sets = normalize_pages(&pages);
        info!(
            job_id = %job_id,
            pages = pages.len(),
            field_sets = field_sets.len(),
            "Analysis finished"
        );
        Ok(AnalysisOutcome { job_id, field_sets })
    }
}
