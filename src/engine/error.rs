// ABOUTME: Error types for task execution engine operations
// ABOUTME: Every variant maps to a stable kind label recorded in failed task metadata

use thiserror::Error;

use crate::queue::QueueError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Unsupported task type in task '{task_id}'")]
    UnsupportedTaskType { task_id: String },

    #[error("No executor registered for task type {task_type}")]
    ExecutorNotRegistered { task_type: String },

    #[error("Task execution failed: {task_id} - {message}")]
    TaskFailed { task_id: String, message: String },

    #[error("Context merge failed for task {task_id}: {message}")]
    ContextError { task_id: String, message: String },

    #[error("Pipeline not found: {scope}/{key}")]
    PipelineNotFound { scope: String, key: String },

    #[error("Pipeline {scope}/{key} has no tasks")]
    EmptyPipeline { scope: String, key: String },

    #[error("Pipeline store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] QueueError),

    #[error("Invalid task payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ExecutionError {
    /// Label stored as `metadata.error.type`
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::UnsupportedTaskType { .. } => "unsupported_task_type",
            ExecutionError::ExecutorNotRegistered { .. } => "executor_not_registered",
            ExecutionError::TaskFailed { .. } => "task_failed",
            ExecutionError::ContextError { .. } => "context",
            ExecutionError::PipelineNotFound { .. } => "pipeline_not_found",
            ExecutionError::EmptyPipeline { .. } => "empty_pipeline",
            ExecutionError::Store(_) => "store",
            ExecutionError::Dispatch(_) => "dispatch",
            ExecutionError::Payload(_) => "payload",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
