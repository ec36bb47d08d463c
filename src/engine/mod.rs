// ABOUTME: Task orchestration engine for document pipelines
// ABOUTME: Handles task execution, result merging, page fan-out, and dispatch of successors

pub mod best_effort;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod orchestrator;
pub mod params;
pub mod result;

pub use context::{merge_results, PageDescriptor, TaskContext, RESERVED_CONTEXT_KEYS};
pub use dispatcher::{Dispatcher, ExecutionMode, Invocation};
pub use error::{ExecutionError, Result};
pub use fanout::expand_for_pages;
pub use orchestrator::TaskOrchestrator;
pub use params::{
    DocumentIdentity, Entities, EntityWrapper, PipelineParameters, Priority, TaskParameters,
};
pub use result::{DispatchRecord, TaskOutcome, TaskResults};
