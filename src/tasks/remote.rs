// ABOUTME: Executor that forwards task parameters to a remote service over HTTP
// ABOUTME: Posts the parameters as JSON and decodes the returned task results

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::TaskExecutor;
use crate::engine::error::{ExecutionError, Result};
use crate::engine::params::TaskParameters;
use crate::engine::result::TaskResults;

pub struct RemoteExecutor {
    name: String,
    url: String,
    timeout: Option<Duration>,
    http_client: Client,
}

impl RemoteExecutor {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            timeout: None,
            http_client: Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn failed(&self, params: &TaskParameters, message: String) -> ExecutionError {
        ExecutionError::TaskFailed {
            task_id: params.task_id().to_string(),
            message,
        }
    }
}

#[async_trait]
impl TaskExecutor for RemoteExecutor {
    async fn run(&self, params: &TaskParameters) -> Result<TaskResults> {
        debug!("Forwarding task {} to {}", params.task_id(), self.url);

        let mut request = self.http_client.post(&self.url).json(params);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.failed(params, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.failed(
                params,
                format!("{} returned status: {}", self.name, response.status()),
            ));
        }

        response
            .json::<TaskResults>()
            .await
            .map_err(|e| self.failed(params, format!("Invalid response body: {}", e)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
