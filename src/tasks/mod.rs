// ABOUTME: Task executor seam: one implementation per task type, looked up by the orchestrator
// ABOUTME: Contains the executor trait, the registry, and the remote HTTP executor

pub mod remote;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::error::Result;
use crate::engine::params::TaskParameters;
use crate::engine::result::TaskResults;
use crate::parser::TaskType;

pub use remote::RemoteExecutor;

/// Runs one task. Executors must tolerate being run more than once for the
/// same parameters because the queue redelivers failed tasks.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run(&self, params: &TaskParameters) -> Result<TaskResults>;

    fn name(&self) -> &str;
}

#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<TaskType, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: TaskType, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(task_type, executor);
    }

    pub fn with_executor(mut self, task_type: TaskType, executor: Arc<dyn TaskExecutor>) -> Self {
        self.register(task_type, executor);
        self
    }

    pub fn get(&self, task_type: TaskType) -> Option<&Arc<dyn TaskExecutor>> {
        self.executors.get(&task_type)
    }

    pub fn supported_types(&self) -> Vec<TaskType> {
        TaskType::ALL
            .iter()
            .copied()
            .filter(|t| self.executors.contains_key(t))
            .collect()
    }
}
