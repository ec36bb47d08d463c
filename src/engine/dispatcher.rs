// ABOUTME: Chooses between in-process execution and enqueueing a continuation
// ABOUTME: Local mode runs everything directly; queued mode resolves a physical queue per task

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::params::TaskParameters;
use super::result::TaskResults;
use crate::queue::{self, EnqueuedTask, QueueNameResolver, QueueTarget, TaskQueue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Local,
    Queued,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Local => write!(f, "local"),
            ExecutionMode::Queued => write!(f, "queued"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ExecutionMode::Local),
            "queued" => Ok(ExecutionMode::Queued),
            other => Err(format!(
                "invalid execution mode: {} (expected local or queued)",
                other
            )),
        }
    }
}

/// Result of handing one task to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Ran in this process.
    Completed {
        params: TaskParameters,
        results: TaskResults,
    },
    /// A continuation carrying `params` was enqueued on `queue`.
    Enqueued {
        queue: String,
        params: TaskParameters,
    },
}

impl Invocation {
    /// The parameters that were handed in
    pub fn params(&self) -> &TaskParameters {
        match self {
            Invocation::Completed { params, .. } => params,
            Invocation::Enqueued { params, .. } => params,
        }
    }

    pub fn queue(&self) -> &str {
        match self {
            Invocation::Completed { .. } => queue::DIRECT_QUEUE,
            Invocation::Enqueued { queue, .. } => queue,
        }
    }
}

enum DispatchMode {
    Local,
    Queued {
        resolver: QueueNameResolver,
        queue: Arc<dyn TaskQueue>,
    },
}

pub struct Dispatcher {
    mode: DispatchMode,
}

impl Dispatcher {
    pub fn local() -> Self {
        Self {
            mode: DispatchMode::Local,
        }
    }

    pub fn queued(resolver: QueueNameResolver, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            mode: DispatchMode::Queued { resolver, queue },
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        match self.mode {
            DispatchMode::Local => ExecutionMode::Local,
            DispatchMode::Queued { .. } => ExecutionMode::Queued,
        }
    }

    /// `Direct` in local mode or when the task's template resolves to `DIRECT`
    pub fn route(&self, params: &TaskParameters) -> queue::Result<QueueTarget> {
        match &self.mode {
            DispatchMode::Local => Ok(QueueTarget::Direct),
            DispatchMode::Queued { resolver, .. } => resolver.resolve(params),
        }
    }

    pub async fn enqueue(&self, queue_name: &str, params: &TaskParameters) -> queue::Result<()> {
        let queue = match &self.mode {
            DispatchMode::Queued { queue, .. } => queue,
            DispatchMode::Local => {
                return Err(queue::QueueError::NotFound {
                    name: queue_name.to_string(),
                })
            }
        };

        let task = EnqueuedTask::for_params(params)?;
        info!(
            "Enqueueing task {} on {} (key {})",
            params.task_id(),
            queue_name,
            task.dedupe_key
        );
        queue.enqueue_task(queue_name, task).await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::local()
    }
}
