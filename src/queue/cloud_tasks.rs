// ABOUTME: REST client for a Cloud Tasks style managed queue service
// ABOUTME: Builds queue and task request bodies and maps HTTP statuses onto queue errors

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::error::{QueueError, Result};
use super::provisioner::{RateLimits, RetryPolicy};
use super::{EnqueuedTask, QueueInfo, TaskQueue};

const MAX_TASK_ID_LEN: usize = 500;

fn default_base_url() -> String {
    "https://cloudtasks.googleapis.com/v2".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudTasksConfig {
    pub project: String,
    pub location: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Worker endpoint that receives each continuation as an HTTP POST.
    pub target_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

pub struct CloudTasksQueue {
    config: CloudTasksConfig,
    token: Option<String>,
    http_client: Client,
}

impl CloudTasksQueue {
    pub fn new(config: CloudTasksConfig) -> Self {
        let token = config
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());
        Self::with_token(config, token)
    }

    pub fn with_token(config: CloudTasksConfig, token: Option<String>) -> Self {
        Self {
            config,
            token,
            http_client: Client::new(),
        }
    }

    pub fn parent_path(&self) -> String {
        format!(
            "projects/{}/locations/{}",
            self.config.project, self.config.location
        )
    }

    pub fn queue_path(&self, name: &str) -> String {
        format!("{}/queues/{}", self.parent_path(), name)
    }

    pub fn task_path(&self, queue: &str, dedupe_key: &str) -> String {
        format!("{}/tasks/{}", self.queue_path(queue), task_id(dedupe_key))
    }

    pub fn create_queue_body(
        &self,
        name: &str,
        rate_limits: &RateLimits,
        retry: &RetryPolicy,
    ) -> Value {
        json!({
            "name": self.queue_path(name),
            "rateLimits": {
                "maxDispatchesPerSecond": rate_limits.max_dispatches_per_second,
                "maxConcurrentDispatches": rate_limits.max_concurrent_dispatches,
            },
            "retryConfig": {
                "maxAttempts": retry.max_attempts,
                "minBackoff": duration_field(retry.min_backoff),
                "maxBackoff": duration_field(retry.max_backoff),
            },
        })
    }

    pub fn create_task_body(&self, queue: &str, task: &EnqueuedTask) -> Value {
        json!({
            "task": {
                "name": self.task_path(queue, &task.dedupe_key),
                "httpRequest": {
                    "url": self.config.target_url,
                    "httpMethod": "POST",
                    "headers": { "Content-Type": "application/json" },
                    "body": base64::engine::general_purpose::STANDARD.encode(&task.payload),
                },
            },
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = self.config.timeout {
            request = request.timeout(timeout);
        }
        request
    }

    async fn check(response: reqwest::Response, name: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(status_error(status, name, message))
    }
}

/// Map a non-success status onto the queue error the provisioner understands
pub fn status_error(status: StatusCode, name: &str, message: String) -> QueueError {
    match status {
        StatusCode::NOT_FOUND => QueueError::NotFound {
            name: name.to_string(),
        },
        StatusCode::CONFLICT => QueueError::AlreadyExists {
            name: name.to_string(),
        },
        other => QueueError::Api {
            status: other.as_u16(),
            message,
        },
    }
}

/// Task ids allow `[A-Za-z0-9_-]` only
pub fn task_id(dedupe_key: &str) -> String {
    dedupe_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TASK_ID_LEN)
        .collect()
}

fn duration_field(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

#[async_trait]
impl TaskQueue for CloudTasksQueue {
    async fn get_queue(&self, name: &str) -> Result<QueueInfo> {
        let request = self.authorize(self.http_client.get(self.url(&self.queue_path(name))));
        let response = Self::check(request.send().await?, name).await?;
        let body: Value = response.json().await?;

        Ok(QueueInfo {
            name: body
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string(),
        })
    }

    async fn create_queue(
        &self,
        name: &str,
        rate_limits: &RateLimits,
        retry: &RetryPolicy,
    ) -> Result<QueueInfo> {
        let url = self.url(&format!("{}/queues", self.parent_path()));
        let body = self.create_queue_body(name, rate_limits, retry);

        let request = self.authorize(self.http_client.post(url).json(&body));
        Self::check(request.send().await?, name).await?;

        info!("Created Cloud Tasks queue {}", self.queue_path(name));
        Ok(QueueInfo {
            name: name.to_string(),
        })
    }

    async fn enqueue_task(&self, queue: &str, task: EnqueuedTask) -> Result<()> {
        let url = self.url(&format!("{}/tasks", self.queue_path(queue)));
        let body = self.create_task_body(queue, &task);

        let request = self.authorize(self.http_client.post(url).json(&body));
        match Self::check(request.send().await?, queue).await {
            Ok(_) => Ok(()),
            Err(QueueError::AlreadyExists { .. }) => {
                debug!("Task {} already enqueued on {}", task.dedupe_key, queue);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
