// ABOUTME: Typed context envelope and the merge of task results into accumulated state
// ABOUTME: Holds page fields the engine reads plus a free-form bucket for executor payloads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ExecutionError, Result};
use super::params::{EntityWrapper, TaskParameters};
use super::result::TaskResults;

pub const PAGE_INFO_KEY: &str = "page_info";
pub const PAGE_STORAGE_URI_KEY: &str = "page_storage_uri";

/// Context keys owned by the engine; task ids may not collide with them.
pub const RESERVED_CONTEXT_KEYS: [&str; 2] = [PAGE_INFO_KEY, PAGE_STORAGE_URI_KEY];

/// One entry of a fan-out task's `pages` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, alias = "uri", skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_info: Option<PageDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_storage_uri: Option<String>,
    /// Executor payloads and per-task result copies keyed by task id.
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl PageDescriptor {
    pub fn new(page_number: u32) -> Self {
        Self {
            page_number: Some(page_number),
            storage_uri: None,
            extra: Map::new(),
        }
    }

    pub fn with_storage_uri(mut self, uri: &str) -> Self {
        self.storage_uri = Some(uri.to_string());
        self
    }
}

impl TaskContext {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Results copy of an earlier task in the same run
    pub fn task_output(&self, task_id: &str) -> Option<&Map<String, Value>> {
        self.values.get(task_id).and_then(Value::as_object)
    }

    pub fn set_page(&mut self, page: PageDescriptor) {
        self.page_storage_uri = page.storage_uri.clone();
        self.page_info = Some(page);
    }
}

/// Merge a successful task's results into the parameters' context and entities.
///
/// `Context[task_id]` receives a copy of the results map. When the task
/// declares an entity schema, an [`EntityWrapper`] is inserted at
/// `Entities[scope][pipeline][task_id]`, creating missing levels.
pub fn merge_results(params: &mut TaskParameters, results: &TaskResults) -> Result<()> {
    let task_id = params.task_config.id.clone();

    if RESERVED_CONTEXT_KEYS.contains(&task_id.as_str()) {
        return Err(ExecutionError::ContextError {
            task_id,
            message: "task id collides with a reserved context key".to_string(),
        });
    }

    params
        .context
        .insert(&task_id, Value::Object(results.results.clone()));

    if let Some(schema) = params.task_config.entity_schema.clone() {
        let wrapper = EntityWrapper::from_results(params, &schema, results)?;
        params
            .entities
            .entry(params.pipeline_scope.clone())
            .or_default()
            .entry(params.pipeline_key.clone())
            .or_default()
            .insert(task_id, wrapper);
    }

    Ok(())
}
