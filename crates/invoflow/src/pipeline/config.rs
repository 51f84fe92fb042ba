use std::time::Duration;

use crate::config::Config;
use crate::queue::RetryPolicy;

/// Worker-side settings derived from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Workers per stage.
    pub worker_count: usize,
    pub lease: Duration,
    /// Fallback wake-up for idle workers.
    pub idle_poll: Duration,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            lease: Duration::from_secs(900),
            idle_poll: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            lease: Duration::from_secs(config.queue.lease_secs),
            idle_poll: Duration::from_millis(config.queue.idle_poll_ms),
            retry: RetryPolicy::from(&config.queue.retry),
        }
    }
}
