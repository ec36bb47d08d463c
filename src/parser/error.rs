// ABOUTME: Error types for pipeline definition parsing and validation
// ABOUTME: Defines specific error types for parser module operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to read pipeline file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Empty pipeline: no tasks defined")]
    EmptyPipeline,

    #[error("Duplicate task id: {task}")]
    DuplicateTask { task: String },

    #[error("Task id '{task}' is reserved for page context")]
    ReservedTaskId { task: String },

    #[error("Unrecognized task type in task '{task}'. Supported types: {supported_types:?}")]
    UnsupportedTaskType {
        task: String,
        supported_types: Vec<String>,
    },

    #[error("Invalid task configuration for '{task}': {reason}")]
    InvalidTaskConfig { task: String, reason: String },

    #[error("Invalid queue template '{template}' in task '{task}': {reason}")]
    InvalidQueueTemplate {
        task: String,
        template: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ParserError>;
