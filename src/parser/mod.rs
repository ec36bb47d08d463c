// ABOUTME: Parser module for declarative pipeline definitions
// ABOUTME: Exports pipeline and task configuration types, parsing, and validation

pub mod error;
pub mod pipeline;
pub mod task;
pub mod validation;

pub use error::{ParserError, ValidationError};
pub use pipeline::{find_task_index, PipelineConfig, PipelineParser};
pub use task::{
    CallbackConfig, EntitySchemaRef, ForEach, ModuleRef, PipelineRef, PostProcessing,
    PromptSpec, TaskConfig, TaskKind, TaskType,
};
pub use validation::{PipelineValidator, ValidationReport};
