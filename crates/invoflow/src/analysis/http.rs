//! JSON-over-HTTP client for the analysis API.
//!
//! `POST {endpoint}/analyses` with `{"bucket", "key"}` starts a job;
//! `GET {endpoint}/analyses/{job_id}?nextToken=...` reports its status.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{AnalysisService, StartResponse, StatusResponse};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

pub struct HttpAnalysisService {
    client: reqwest::Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl std::fmt::Debug for HttpAnalysisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAnalysisService")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpAnalysisService {
    pub fn new(
        endpoint: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> crate::error::Result<Self> {
        let token = config.token.resolve_optional()?;
        Ok(Self::new(
            &config.endpoint,
            token,
            Duration::from_secs(config.request_timeout_secs),
        )?)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AnalysisError> {
        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            return serde_json::from_slice(&body)
                .map_err(|e| AnalysisError::MalformedResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(AnalysisError::Transport(message))
        } else {
            Err(AnalysisError::Rejected(message))
        }
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn start_analysis(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<StartResponse, AnalysisError> {
        let url = format!("{}/analyses", self.endpoint);
        let request = self
            .client
            .post(&url)
            .json(&json!({ "bucket": bucket, "key": key }));
        let response = self.authorize(request).send().await?;
        Self::decode(response).await
    }

    async fn get_status(
        &self,
        job_id: &str,
        next_token: Option<&str>,
    ) -> Result<StatusResponse, AnalysisError> {
        let url = format!("{}/analyses/{}", self.endpoint, job_id);
        let mut request = self.client.get(&url);
        if let Some(token) = next_token {
            request = request.query(&[("nextToken", token)]);
        }
        let response = self.authorize(request).send().await?;
        Self::decode(response).await
    }
}
