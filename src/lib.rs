// ABOUTME: Main library module for the docpipe pipeline orchestration engine
// ABOUTME: Exports all core modules and provides the public API

pub mod cli;
pub mod engine;
pub mod output;
pub mod parser;
pub mod queue;
pub mod store;
pub mod tasks;

// Re-export commonly used types
pub use cli::{App, Args, Config};
pub use engine::{
    DocumentIdentity, Dispatcher, ExecutionMode, Invocation, PipelineParameters, TaskOrchestrator,
    TaskParameters, TaskResults,
};
pub use parser::{PipelineConfig, PipelineParser, PipelineValidator, TaskConfig};
pub use queue::{QueueNameResolver, QueueProvisioner, TaskQueue};
pub use store::{CachedConfigStore, PipelineConfigStore, PipelinePublisher};
pub use tasks::{ExecutorRegistry, TaskExecutor};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
