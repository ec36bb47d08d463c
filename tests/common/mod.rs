// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides pipeline builders, scripted executors, and recording sinks for orchestrator tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;
use tokio::sync::Mutex;

use docpipe::engine::{
    DocumentIdentity, ExecutionError, PipelineParameters, TaskParameters, TaskResults,
};
use docpipe::output::{AuditSink, CallbackPayload, CallbackPublisher, OutputError};
use docpipe::parser::{PipelineConfig, TaskConfig, TaskType};
use docpipe::store::{CachedConfigStore, InMemoryPipelineSource, TtlCache};
use docpipe::tasks::{ExecutorRegistry, TaskExecutor};

pub const SCOPE: &str = "clinical";
pub const KEY: &str = "intake";

pub struct TestPipelineBuilder {
    scope: String,
    key: String,
    tasks: Vec<TaskConfig>,
}

impl TestPipelineBuilder {
    pub fn new(scope: &str, key: &str) -> Self {
        Self {
            scope: scope.to_string(),
            key: key.to_string(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn add_module_task(self, id: &str) -> Self {
        self.with_task(TaskConfig::module(id, id))
    }

    pub fn add_prompt_task(self, id: &str, template: &str) -> Self {
        self.with_task(TaskConfig::prompt(id, template))
    }

    pub fn build(self) -> PipelineConfig {
        PipelineConfig::new(&self.scope, &self.key, self.tasks)
    }

    pub fn to_yaml(self) -> String {
        self.build().to_yaml().unwrap()
    }

    pub async fn write_to_file(self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.to_yaml()).await
    }
}

pub fn identity() -> DocumentIdentity {
    DocumentIdentity::new("app-1", "tenant-1", "patient-1", "doc-1")
}

pub fn seed() -> PipelineParameters {
    PipelineParameters::new(identity(), SCOPE, KEY).with_run_id("run-1")
}

pub fn store_with(pipelines: Vec<PipelineConfig>) -> Arc<CachedConfigStore> {
    Arc::new(CachedConfigStore::new(
        Arc::new(InMemoryPipelineSource::with_pipelines(pipelines)),
        Arc::new(TtlCache::new(std::time::Duration::from_secs(60))),
    ))
}

pub fn results(value: Value) -> TaskResults {
    match value {
        Value::Object(map) => TaskResults::success(map),
        _ => TaskResults::success(Map::new()),
    }
}

/// Returns canned results per task id and records every invocation it sees
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: HashMap<String, TaskResults>,
    calls: Mutex<Vec<TaskParameters>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, task_id: &str, results: TaskResults) -> Self {
        self.responses.insert(task_id.to_string(), results);
        self
    }

    pub async fn calls(&self) -> Vec<TaskParameters> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_for(&self, task_id: &str) -> Vec<TaskParameters> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|p| p.task_id() == task_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn run(&self, params: &TaskParameters) -> docpipe::engine::Result<TaskResults> {
        self.calls.lock().await.push(params.clone());
        Ok(self
            .responses
            .get(params.task_id())
            .cloned()
            .unwrap_or_else(|| results(json!({ "task": params.task_id() }))))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Always errors, as a broken downstream service would
pub struct FailingExecutor;

#[async_trait]
impl TaskExecutor for FailingExecutor {
    async fn run(&self, params: &TaskParameters) -> docpipe::engine::Result<TaskResults> {
        Err(ExecutionError::TaskFailed {
            task_id: params.task_id().to_string(),
            message: "service unavailable".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub fn registry_for(executor: Arc<dyn TaskExecutor>) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    for task_type in TaskType::ALL {
        registry.register(task_type, executor.clone());
    }
    registry
}

/// Rejects every write, as a full or unreachable bucket would
#[derive(Default)]
pub struct FailingAuditSink {
    pub attempts: Mutex<Vec<String>>,
}

impl FailingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn write(&self, path: &str, _body: &[u8]) -> docpipe::output::Result<()> {
        self.attempts.lock().await.push(path.to_string());
        Err(OutputError::WriteError {
            message: format!("bucket unavailable: {}", path),
        })
    }
}

#[derive(Default)]
pub struct RecordingCallbackPublisher {
    pub published: Mutex<Vec<(String, CallbackPayload)>>,
    fail: bool,
}

impl RecordingCallbackPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl CallbackPublisher for RecordingCallbackPublisher {
    async fn publish(
        &self,
        endpoint: &str,
        payload: &CallbackPayload,
    ) -> docpipe::output::Result<()> {
        self.published
            .lock()
            .await
            .push((endpoint.to_string(), payload.clone()));
        if self.fail {
            return Err(OutputError::CallbackError {
                endpoint: endpoint.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub pipelines_dir: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let pipelines_dir = temp_dir.path().join("pipelines");
        std::fs::create_dir_all(&pipelines_dir).unwrap();
        Self {
            temp_dir,
            pipelines_dir,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub async fn create_pipeline_file(&self, name: &str, builder: TestPipelineBuilder) -> PathBuf {
        let path = self.temp_dir.path().join(format!("{}.yaml", name));
        builder.write_to_file(&path).await.unwrap();
        path
    }

    /// Store a pipeline where the file-backed source looks for it
    pub async fn install_pipeline(&self, builder: TestPipelineBuilder) -> PipelineConfig {
        let pipeline = builder.build();
        let dir = self.pipelines_dir.join(&pipeline.scope);
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(
            dir.join(format!("{}.yaml", pipeline.key)),
            pipeline.to_yaml().unwrap(),
        )
        .await
        .unwrap();
        pipeline
    }
}
