// ABOUTME: Task configuration structures for pipeline definitions
// ABOUTME: Defines task kinds, page fan-out policy, entity bindings, callbacks, and queue templates

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One step of a pipeline. Immutable once the owning pipeline is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: String,
    #[serde(flatten)]
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_processing: Option<PostProcessing>,
    #[serde(
        default,
        alias = "entity_schema_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub entity_schema: Option<EntitySchemaRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackConfig>,
    /// Logical queue-name template, `DEFAULT` or `DIRECT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoke: Option<String>,
}

/// Type-specific payload, tagged by the `type` field.
///
/// Any tag other than `MODULE`, `PROMPT` or `PIPELINE` deserializes to
/// `Unknown` so that a stale or hand-edited payload still reaches the
/// orchestrator and fails as a task instead of as a decode error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum TaskKind {
    Module { module: ModuleRef },
    Prompt { prompt: PromptSpec },
    Pipeline { pipelines: Vec<PipelineRef> },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskType {
    Module,
    Prompt,
    Pipeline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRef {
    pub scope: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessing {
    pub for_each: ForEach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForEach {
    Page,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchemaRef {
    #[serde(alias = "schema_uri")]
    pub uri: String,
    /// Key of the task results holding the extracted entities.
    #[serde(default = "default_entity_variable")]
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackConfig {
    pub endpoint: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub embed_entities: bool,
}

fn default_entity_variable() -> String {
    "entities".to_string()
}

fn default_enabled() -> bool {
    true
}

impl TaskConfig {
    pub fn module(id: &str, module: &str) -> Self {
        Self::with_kind(
            id,
            TaskKind::Module {
                module: ModuleRef {
                    name: module.to_string(),
                    version: None,
                    config: Map::new(),
                },
            },
        )
    }

    pub fn prompt(id: &str, template: &str) -> Self {
        Self::with_kind(
            id,
            TaskKind::Prompt {
                prompt: PromptSpec {
                    name: None,
                    template: template.to_string(),
                    model: None,
                    parameters: Map::new(),
                },
            },
        )
    }

    pub fn with_kind(id: &str, kind: TaskKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            post_processing: None,
            entity_schema: None,
            callback: None,
            invoke: None,
        }
    }

    pub fn for_each_page(mut self) -> Self {
        self.post_processing = Some(PostProcessing {
            for_each: ForEach::Page,
        });
        self
    }

    pub fn with_entity_schema(mut self, uri: &str, variable: &str) -> Self {
        self.entity_schema = Some(EntitySchemaRef {
            uri: uri.to_string(),
            variable: variable.to_string(),
        });
        self
    }

    pub fn with_callback(mut self, endpoint: &str, embed_entities: bool) -> Self {
        self.callback = Some(CallbackConfig {
            endpoint: endpoint.to_string(),
            enabled: true,
            embed_entities,
        });
        self
    }

    pub fn with_invoke(mut self, template: &str) -> Self {
        self.invoke = Some(template.to_string());
        self
    }

    /// `None` for tags this build does not recognize.
    pub fn task_type(&self) -> Option<TaskType> {
        self.kind.task_type()
    }

    pub fn fans_out_per_page(&self) -> bool {
        matches!(
            self.post_processing,
            Some(PostProcessing {
                for_each: ForEach::Page
            })
        )
    }

    pub fn callback_enabled(&self) -> Option<&CallbackConfig> {
        self.callback.as_ref().filter(|c| c.enabled)
    }
}

impl TaskKind {
    pub fn task_type(&self) -> Option<TaskType> {
        match self {
            TaskKind::Module { .. } => Some(TaskType::Module),
            TaskKind::Prompt { .. } => Some(TaskType::Prompt),
            TaskKind::Pipeline { .. } => Some(TaskType::Pipeline),
            TaskKind::Unknown => None,
        }
    }
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [TaskType::Module, TaskType::Prompt, TaskType::Pipeline];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Module => "MODULE",
            TaskType::Prompt => "PROMPT",
            TaskType::Pipeline => "PIPELINE",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
