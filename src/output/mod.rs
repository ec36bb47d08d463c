// ABOUTME: Output side effects of task execution: audit persistence and result callbacks
// ABOUTME: Both are best-effort from the orchestrator's point of view

pub mod audit;
pub mod callback;
pub mod error;

pub use audit::{audit_path, AuditFile, AuditSink, LocalAuditSink, MemoryAuditSink};
pub use callback::{CallbackPayload, CallbackPublisher, HttpCallbackPublisher};
pub use error::{OutputError, Result};
