// ABOUTME: Distributed task queue abstraction used by the dispatcher and publisher
// ABOUTME: Exports the queue trait, name resolver, provisioner, and queue clients

pub mod cloud_tasks;
pub mod error;
pub mod memory;
pub mod provisioner;
pub mod resolver;

pub use cloud_tasks::{CloudTasksConfig, CloudTasksQueue};
pub use error::{QueueError, Result};
pub use memory::InMemoryQueue;
pub use provisioner::{ProvisionReport, QueueProvisioner, RateLimits, RetryPolicy};
pub use resolver::{
    expand_queue_templates, QueueNameResolver, QueueTarget, TokenValues, DEFAULT_QUEUE,
    DIRECT_QUEUE,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::params::TaskParameters;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub name: String,
}

/// A continuation: serialized task parameters plus the key that
/// identifies this logical invocation across redeliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueuedTask {
    pub dedupe_key: String,
    pub payload: Vec<u8>,
}

impl EnqueuedTask {
    pub fn for_params(params: &TaskParameters) -> Result<Self> {
        Ok(Self {
            dedupe_key: params.dedupe_key(),
            payload: serde_json::to_vec(params)?,
        })
    }

    pub fn decode(&self) -> Result<TaskParameters> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// `QueueError::NotFound` when the queue does not exist
    async fn get_queue(&self, name: &str) -> Result<QueueInfo>;

    /// `QueueError::AlreadyExists` when another caller created it first
    async fn create_queue(
        &self,
        name: &str,
        rate_limits: &RateLimits,
        retry: &RetryPolicy,
    ) -> Result<QueueInfo>;

    /// Enqueueing a key that is already present is a successful no-op
    async fn enqueue_task(&self, queue: &str, task: EnqueuedTask) -> Result<()>;
}
