// ABOUTME: Idempotent queue provisioning with fixed rate limits and retry policy
// ABOUTME: Treats a concurrent create (409) as an existing queue rather than an error

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::error::{QueueError, Result};
use super::resolver::is_pseudo_queue;
use super::TaskQueue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimits {
    pub max_concurrent_dispatches: u32,
    pub max_dispatches_per_second: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub min_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_concurrent_dispatches: 50,
            max_dispatches_per_second: 10.0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

pub struct QueueProvisioner {
    queue: Arc<dyn TaskQueue>,
    rate_limits: RateLimits,
    retry: RetryPolicy,
}

impl QueueProvisioner {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            queue,
            rate_limits: RateLimits::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check-then-create. Returns `true` only when this call created the queue.
    pub async fn ensure_queue_exists(&self, name: &str) -> Result<bool> {
        if is_pseudo_queue(name) {
            return Ok(false);
        }

        match self.queue.get_queue(name).await {
            Ok(_) => {
                debug!("Queue {} already exists", name);
                return Ok(false);
            }
            Err(QueueError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        match self
            .queue
            .create_queue(name, &self.rate_limits, &self.retry)
            .await
        {
            Ok(_) => {
                info!("Created queue {}", name);
                Ok(true)
            }
            Err(QueueError::AlreadyExists { .. }) => {
                debug!("Queue {} was created concurrently", name);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn ensure_all(&self, names: &[String]) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::default();

        for name in names {
            if self.ensure_queue_exists(name).await? {
                report.created.push(name.clone());
            } else {
                report.existing.push(name.clone());
            }
        }

        Ok(report)
    }
}
