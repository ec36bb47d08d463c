// ABOUTME: Task and pipeline parameter types threaded through every invocation
// ABOUTME: Carries document identity, run id, bound task, accumulated context, and entities

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::context::TaskContext;
use super::error::{ExecutionError, Result};
use super::result::TaskResults;
use crate::parser::{EntitySchemaRef, TaskConfig};

/// Entities keyed by pipeline scope, then pipeline key, then task id.
pub type Entities = HashMap<String, HashMap<String, HashMap<String, EntityWrapper>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentIdentity {
    pub app_id: String,
    pub tenant_id: String,
    pub patient_id: String,
    pub document_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Default,
    Quarantine,
}

/// Seed for one pipeline run: everything except the task being executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParameters {
    #[serde(flatten)]
    pub identity: DocumentIdentity,
    pub pipeline_scope: String,
    pub pipeline_key: String,
    pub run_id: String,
    #[serde(default)]
    pub priority: Priority,
}

/// Execution context of a single task invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParameters {
    #[serde(flatten)]
    pub identity: DocumentIdentity,
    /// Absent for document-scoped tasks, set on tasks produced by page fan-out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub pipeline_scope: String,
    pub pipeline_key: String,
    pub run_id: String,
    #[serde(default)]
    pub priority: Priority,
    pub task_config: TaskConfig,
    #[serde(default)]
    pub context: TaskContext,
    #[serde(default)]
    pub entities: Entities,
}

/// Schema-tagged output of one entity-producing task. Never mutated after merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityWrapper {
    pub schema_ref: String,
    #[serde(flatten)]
    pub identity: DocumentIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub run_id: String,
    pub entities: Value,
}

impl DocumentIdentity {
    pub fn new(app_id: &str, tenant_id: &str, patient_id: &str, document_id: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            tenant_id: tenant_id.to_string(),
            patient_id: patient_id.to_string(),
            document_id: document_id.to_string(),
        }
    }
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Default, Priority::Quarantine];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Default => "default",
            Priority::Quarantine => "quarantine",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "default" => Ok(Priority::Default),
            "quarantine" => Ok(Priority::Quarantine),
            other => Err(format!(
                "invalid priority: {} (expected high, default or quarantine)",
                other
            )),
        }
    }
}

impl PipelineParameters {
    /// Start a new run with a fresh run id
    pub fn new(identity: DocumentIdentity, scope: &str, key: &str) -> Self {
        Self {
            identity,
            pipeline_scope: scope.to_string(),
            pipeline_key: key.to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            priority: Priority::Default,
        }
    }

    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = run_id.to_string();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Stamp out document-scoped parameters for `task` with empty state
    pub fn bind(&self, task: TaskConfig) -> TaskParameters {
        self.bind_with(task, None, TaskContext::default(), Entities::new())
    }

    pub fn bind_with(
        &self,
        task: TaskConfig,
        page_number: Option<u32>,
        context: TaskContext,
        entities: Entities,
    ) -> TaskParameters {
        TaskParameters {
            identity: self.identity.clone(),
            page_number,
            pipeline_scope: self.pipeline_scope.clone(),
            pipeline_key: self.pipeline_key.clone(),
            run_id: self.run_id.clone(),
            priority: self.priority,
            task_config: task,
            context,
            entities,
        }
    }
}

impl TaskParameters {
    pub fn task_id(&self) -> &str {
        &self.task_config.id
    }

    pub fn pipeline(&self) -> PipelineParameters {
        PipelineParameters {
            identity: self.identity.clone(),
            pipeline_scope: self.pipeline_scope.clone(),
            pipeline_key: self.pipeline_key.clone(),
            run_id: self.run_id.clone(),
            priority: self.priority,
        }
    }

    /// Parameters for the next task in sequence, carrying state forward.
    ///
    /// A page-scoped task keeps its page so the rest of the pipeline continues
    /// per page after a fan-out.
    pub fn successor(&self, next: &TaskConfig) -> TaskParameters {
        self.pipeline().bind_with(
            next.clone(),
            self.page_number,
            self.context.clone(),
            self.entities.clone(),
        )
    }

    /// `"document"` or the page number, as used in audit paths.
    pub fn scope_label(&self) -> String {
        match self.page_number {
            Some(page) => page.to_string(),
            None => "document".to_string(),
        }
    }

    /// Stable key for one logical invocation: redeliveries of the same
    /// continuation produce the same key.
    pub fn dedupe_key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.run_id,
            self.task_config.id,
            self.scope_label()
        )
    }

    pub fn entity(&self, scope: &str, pipeline: &str, task_id: &str) -> Option<&EntityWrapper> {
        self.entities.get(scope)?.get(pipeline)?.get(task_id)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(ExecutionError::Payload)
    }

    pub fn from_json(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(ExecutionError::Payload)
    }
}

impl EntityWrapper {
    /// Build the wrapper from a task's results, reading the schema's variable
    pub fn from_results(
        params: &TaskParameters,
        schema: &EntitySchemaRef,
        results: &TaskResults,
    ) -> Result<Self> {
        let entities = match results.results.get(&schema.variable) {
            Some(Value::Null) | None => {
                return Err(ExecutionError::ContextError {
                    task_id: params.task_config.id.clone(),
                    message: format!(
                        "results have no '{}' entry for schema {}",
                        schema.variable, schema.uri
                    ),
                });
            }
            Some(value) => value.clone(),
        };

        Ok(Self {
            schema_ref: schema.uri.clone(),
            identity: params.identity.clone(),
            page_number: params.page_number,
            run_id: params.run_id.clone(),
            entities,
        })
    }
}
