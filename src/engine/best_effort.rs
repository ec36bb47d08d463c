// ABOUTME: Fire-and-forget helper for side effects whose failure must not fail a task
// ABOUTME: Audit writes, callbacks, and context merges report errors here and carry on

use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Await `operation`, logging and discarding any error.
pub async fn best_effort<F, T, E>(operation: &str, fut: F) -> Option<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Best-effort {} failed: {}", operation, e);
            None
        }
    }
}

/// Synchronous counterpart of [`best_effort`]
pub fn log_failure<T, E: Display>(operation: &str, result: std::result::Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Best-effort {} failed: {}", operation, e);
            None
        }
    }
}
