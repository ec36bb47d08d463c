// ABOUTME: Error types for queue resolution, provisioning, and enqueue operations
// ABOUTME: Separates not-found and already-exists responses from transport failures

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue not found: {name}")]
    NotFound { name: String },

    #[error("Queue already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Cannot render queue template '{template}': {reason}")]
    Template { template: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Queue API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to serialize task payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
