// ABOUTME: Result callbacks published to external callers after a successful task
// ABOUTME: Builds the callback payload and posts it over HTTP

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::info;

use super::error::{OutputError, Result};
use crate::engine::params::{DocumentIdentity, EntityWrapper, TaskParameters};
use crate::engine::result::TaskResults;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    #[serde(flatten)]
    pub identity: DocumentIdentity,
    pub run_id: String,
    pub pipeline_scope: String,
    pub pipeline_key: String,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub success: bool,
    pub results: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<EntityWrapper>,
    pub completed_at: DateTime<Utc>,
}

impl CallbackPayload {
    /// Entities are attached only when `embed_entities` is set and the task produced them
    pub fn build(params: &TaskParameters, results: &TaskResults, embed_entities: bool) -> Self {
        let entities = if embed_entities {
            params
                .entity(&params.pipeline_scope, &params.pipeline_key, params.task_id())
                .cloned()
        } else {
            None
        };

        Self {
            identity: params.identity.clone(),
            run_id: params.run_id.clone(),
            pipeline_scope: params.pipeline_scope.clone(),
            pipeline_key: params.pipeline_key.clone(),
            task_id: params.task_id().to_string(),
            page_number: params.page_number,
            success: results.success,
            results: results.results.clone(),
            entities,
            completed_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait CallbackPublisher: Send + Sync {
    async fn publish(&self, endpoint: &str, payload: &CallbackPayload) -> Result<()>;
}

pub struct HttpCallbackPublisher {
    http_client: Client,
    timeout: Option<Duration>,
}

impl HttpCallbackPublisher {
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpCallbackPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallbackPublisher for HttpCallbackPublisher {
    async fn publish(&self, endpoint: &str, payload: &CallbackPayload) -> Result<()> {
        let mut request = self.http_client.post(endpoint).json(payload);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OutputError::CallbackError {
                endpoint: endpoint.to_string(),
                message: format!("HTTP request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(OutputError::CallbackError {
                endpoint: endpoint.to_string(),
                message: format!("HTTP callback failed with status: {}", response.status()),
            });
        }

        info!(
            "Callback for task {} delivered to {}",
            payload.task_id, endpoint
        );
        Ok(())
    }
}
