// ABOUTME: Error types for audit persistence and result callbacks
// ABOUTME: Defines specific error types for the output module's side effects

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Write error: {message}")]
    WriteError { message: String },

    #[error("Callback to {endpoint} failed: {message}")]
    CallbackError { endpoint: String, message: String },
}

pub type Result<T> = std::result::Result<T, OutputError>;
