// ABOUTME: Pipeline definition structure and parsing from YAML or JSON
// ABOUTME: Provides ordered task lookup used to decide which task runs next

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

use super::error::{ParserError, Result, ValidationError};
use super::task::TaskConfig;

fn default_version() -> String {
    "1".to_string()
}

/// An ordered, versioned list of tasks identified by `(scope, key)`.
///
/// Order is significant: the task after index `i` is `tasks[i + 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub scope: String,
    pub key: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tasks: Vec<TaskConfig>,
}

impl PipelineConfig {
    pub fn new(scope: &str, key: &str, tasks: Vec<TaskConfig>) -> Self {
        Self {
            scope: scope.to_string(),
            key: key.to_string(),
            version: default_version(),
            description: None,
            tasks,
        }
    }

    /// Parse a pipeline from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ParserError::IoError)?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let pipeline: PipelineConfig =
            serde_yaml::from_str(content).map_err(ParserError::YamlError)?;
        pipeline.validate_structure()?;
        Ok(pipeline)
    }

    /// Parse a pipeline from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let pipeline: PipelineConfig =
            serde_json::from_str(content).map_err(ParserError::JsonError)?;
        pipeline.validate_structure()?;
        Ok(pipeline)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ParserError::YamlError)
    }

    fn validate_structure(&self) -> Result<()> {
        if self.scope.trim().is_empty() {
            return Err(ParserError::MissingField("scope".to_string()));
        }
        if self.key.trim().is_empty() {
            return Err(ParserError::MissingField("key".to_string()));
        }
        if self.tasks.is_empty() {
            return Err(ParserError::ValidationError(ValidationError::EmptyPipeline));
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(ParserError::ValidationError(
                    ValidationError::DuplicateTask {
                        task: task.id.clone(),
                    },
                ));
            }
        }

        Ok(())
    }

    /// Scope-qualified identifier, used for the `{pipeline_id}` queue token.
    pub fn pipeline_id(&self) -> String {
        pipeline_id(&self.scope, &self.key)
    }

    pub fn find_task_index(&self, task_id: &str) -> Option<usize> {
        find_task_index(&self.tasks, task_id)
    }

    pub fn get_task(&self, task_id: &str) -> Option<&TaskConfig> {
        self.find_task_index(task_id).map(|i| &self.tasks[i])
    }

    pub fn first_task(&self) -> Option<&TaskConfig> {
        self.tasks.first()
    }

    /// Task following `task_id`, or `None` when it is the last one or unknown.
    pub fn next_task(&self, task_id: &str) -> Option<&TaskConfig> {
        self.find_task_index(task_id)
            .and_then(|i| self.tasks.get(i + 1))
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    /// Every queue template referenced by the pipeline, in task order.
    pub fn invoke_templates(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter_map(|t| t.invoke.clone())
            .collect()
    }
}

/// Linear scan for a task ID; `None` when absent.
pub fn find_task_index(tasks: &[TaskConfig], task_id: &str) -> Option<usize> {
    tasks.iter().position(|t| t.id == task_id)
}

pub fn pipeline_id(scope: &str, key: &str) -> String {
    format!("{}-{}", scope, key)
}

pub struct PipelineParser;

impl PipelineParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a pipeline file, choosing the format from its extension
    pub async fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<PipelineConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(ParserError::IoError)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => PipelineConfig::from_json(&content),
            _ => PipelineConfig::from_yaml(&content),
        }
    }
}

impl Default for PipelineParser {
    fn default() -> Self {
        Self::new()
    }
}
