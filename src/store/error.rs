// ABOUTME: Error types for pipeline definition storage and publishing
// ABOUTME: Wraps filesystem, parse, validation, and queue provisioning failures

use thiserror::Error;

use crate::parser::ParserError;
use crate::queue::QueueError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access pipeline store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse stored pipeline {scope}/{key}: {source}")]
    Parse {
        scope: String,
        key: String,
        #[source]
        source: ParserError,
    },

    #[error("Failed to serialize pipeline: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("Pipeline {scope}/{key} failed validation: {errors:?}")]
    Invalid {
        scope: String,
        key: String,
        errors: Vec<String>,
    },

    #[error("Queue provisioning failed: {0}")]
    Provisioning(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
