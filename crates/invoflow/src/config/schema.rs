use serde::{Deserialize, Serialize};

use crate::secrets::SecretSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite database file. Defaults to `~/.invoflow/data/invoflow.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Workers per pipeline stage.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding object bytes for the local object store.
    pub root: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Prefix for keys of uploaded files: `{key_prefix}/{folder_id}/...`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Base URL under which objects are served. Without it no URLs are
    /// stored on files and presigning is unavailable.
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default)]
    pub signing_secret: SecretSource,
}

fn default_bucket() -> String {
    "invoflow".to_string()
}

fn default_key_prefix() -> String {
    "uploads".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub endpoint: String,
    #[serde(default)]
    pub token: SecretSource,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl AnalysisConfig {
    /// Longest a single analysis can take: every status poll plus one
    /// request timeout.
    pub fn worst_case_secs(&self) -> u64 {
        self.poll_interval_secs
            .saturating_mul(u64::from(self.max_poll_attempts))
            .saturating_add(self.request_timeout_secs)
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_poll_attempts() -> u32 {
    120
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How long a claimed task stays invisible to other workers.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    /// Upper bound on how long an idle worker sleeps before re-checking.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_lease_secs() -> u64 {
    900
}

fn default_idle_poll_ms() -> u64 {
    500
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_secs: default_lease_secs(),
            idle_poll_ms: default_idle_poll_ms(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// When set, batch completion emails are POSTed here as JSON.
    /// Otherwise they are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Static user directory entry used to address completion emails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserConfig {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
}
