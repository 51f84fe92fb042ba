use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification transport failed: {0}")]
    Transport(String),

    #[error("Notification endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}

/// Payload of the "your upload batch is done" email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCompletedEmail {
    pub to_email: String,
    pub user_name: String,
    pub folder_name: String,
    pub total_files: u32,
    pub completed_files: u32,
    pub failed_files: u32,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_batch_completed(&self, email: &BatchCompletedEmail) -> Result<(), NotifyError>;
}

/// Writes the email as a tracing event instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_batch_completed(&self, email: &BatchCompletedEmail) -> Result<(), NotifyError> {
        tracing::info!(
            to = %email.to_email,
            folder = %email.folder_name,
            total = email.total_files,
            completed = email.completed_files,
            failed = email.failed_files,
            "Batch completed email"
        );
        Ok(())
    }
}

/// POSTs the email payload as JSON to a mail service webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_batch_completed(&self, email: &BatchCompletedEmail) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(email).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(to = %email.to_email, "Batch completed email handed to webhook");
        Ok(())
    }
}
