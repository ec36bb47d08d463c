// ABOUTME: Task execution result types returned by executors and the orchestrator
// ABOUTME: Carries success flag, free-form results, error message, and structured metadata

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const PAGES_KEY: &str = "pages";
pub const ERROR_METADATA_KEY: &str = "error";
pub const NEXT_TASKS_METADATA_KEY: &str = "next_tasks";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResults {
    pub success: bool,
    #[serde(default)]
    pub results: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Outcome of one invocation. Nothing is persisted inside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Success,
    Failure,
    Skipped,
}

impl TaskResults {
    pub fn success(results: Map<String, Value>) -> Self {
        Self {
            success: true,
            results,
            error_message: None,
            metadata: Map::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            results: Map::new(),
            error_message: Some(message.into()),
            metadata: Map::new(),
        }
    }

    /// Upstream decided the task should not run
    pub fn skipped(reason: impl Into<String>) -> Self {
        let mut results = Self::success(Map::new());
        results
            .metadata
            .insert("skipped".to_string(), Value::String(reason.into()));
        results
    }

    /// Failed result carrying the `error` metadata map
    pub fn with_error(kind: &str, message: impl Into<String>, task_id: &str) -> Self {
        let message = message.into();
        let mut results = Self::failure(message.clone());
        results.set_error_metadata(kind, &message, task_id);
        results
    }

    pub fn set_error_metadata(&mut self, kind: &str, message: &str, task_id: &str) {
        self.metadata.insert(
            ERROR_METADATA_KEY.to_string(),
            json!({
                "type": kind,
                "message": message,
                "task_id": task_id,
            }),
        );
    }

    pub fn with_result(mut self, key: &str, value: Value) -> Self {
        self.results.insert(key.to_string(), value);
        self
    }

    /// The `pages` list of a fan-out task, if present and a list
    pub fn pages(&self) -> Option<&Vec<Value>> {
        self.results.get(PAGES_KEY).and_then(Value::as_array)
    }

    pub fn error_metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata
            .get(ERROR_METADATA_KEY)
            .and_then(Value::as_object)
    }

    /// Record the successors handed to the dispatcher
    pub fn record_next_tasks(&mut self, dispatched: &[DispatchRecord]) {
        let task_ids: Vec<&str> = dispatched.iter().map(|d| d.task_id.as_str()).collect();
        self.metadata.insert(
            NEXT_TASKS_METADATA_KEY.to_string(),
            json!({
                "count": dispatched.len(),
                "task_ids": task_ids,
                "dispatched": dispatched,
            }),
        );
    }

    pub fn next_task_count(&self) -> usize {
        self.metadata
            .get(NEXT_TASKS_METADATA_KEY)
            .and_then(|v| v.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize
    }

    pub fn dispatch_records(&self) -> Vec<DispatchRecord> {
        self.metadata
            .get(NEXT_TASKS_METADATA_KEY)
            .map(records_from)
            .unwrap_or_default()
    }

    /// False if this task or any successor run in-process failed
    pub fn chain_succeeded(&self) -> bool {
        self.success && self.dispatch_records().iter().all(DispatchRecord::chain_succeeded)
    }

    pub fn outcome(&self) -> TaskOutcome {
        if !self.success {
            TaskOutcome::Failure
        } else if self.metadata.contains_key("skipped") {
            TaskOutcome::Skipped
        } else {
            TaskOutcome::Success
        }
    }
}

/// Where one successor went and, when it ran in-process, how it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Physical queue name, or `DIRECT` for in-process execution.
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TaskOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_tasks: Option<Value>,
}

impl DispatchRecord {
    pub fn enqueued(task_id: &str, page_number: Option<u32>, queue: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            page_number,
            queue: queue.to_string(),
            outcome: None,
            next_tasks: None,
        }
    }

    pub fn completed(
        task_id: &str,
        page_number: Option<u32>,
        queue: &str,
        results: &TaskResults,
    ) -> Self {
        Self {
            task_id: task_id.to_string(),
            page_number,
            queue: queue.to_string(),
            outcome: Some(results.outcome()),
            next_tasks: results.metadata.get(NEXT_TASKS_METADATA_KEY).cloned(),
        }
    }

    fn chain_succeeded(&self) -> bool {
        self.outcome != Some(TaskOutcome::Failure)
            && self
                .next_tasks
                .as_ref()
                .map(records_from)
                .unwrap_or_default()
                .iter()
                .all(DispatchRecord::chain_succeeded)
    }
}

fn records_from(next_tasks: &Value) -> Vec<DispatchRecord> {
    next_tasks
        .get("dispatched")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Success => write!(f, "success"),
            TaskOutcome::Failure => write!(f, "failure"),
            TaskOutcome::Skipped => write!(f, "skipped"),
        }
    }
}
