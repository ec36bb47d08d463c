// ABOUTME: Command implementations for the docpipe CLI
// ABOUTME: Wires configuration into the store, queues, executors, and orchestrator for each command

use anyhow::Result;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::config::Config;
use crate::engine::{
    Dispatcher, ExecutionMode, Invocation, PipelineParameters, TaskContext, TaskOrchestrator,
};
use crate::output::{HttpCallbackPublisher, LocalAuditSink};
use crate::parser::{PipelineConfig, PipelineParser, PipelineValidator, TaskType};
use crate::queue::{
    CloudTasksQueue, InMemoryQueue, QueueNameResolver, QueueProvisioner, TaskQueue,
};
use crate::store::{CachedConfigStore, FilePipelineSource, PipelinePublisher, TtlCache};
use crate::tasks::{ExecutorRegistry, RemoteExecutor};

/// Everything `docpipe run` needs besides configuration
pub struct RunRequest {
    pub seed: PipelineParameters,
    pub context: Map<String, Value>,
    pub mode: ExecutionMode,
    pub output: Option<PathBuf>,
}

/// Queue backend chosen from configuration. Without Cloud Tasks settings,
/// continuations are held in memory and reported when the command ends.
pub enum QueueBackend {
    CloudTasks(Arc<CloudTasksQueue>),
    Memory(Arc<InMemoryQueue>),
}

impl QueueBackend {
    pub fn from_config(config: &Config) -> Self {
        match config.queues.cloud_tasks {
            Some(ref cloud_tasks) => {
                QueueBackend::CloudTasks(Arc::new(CloudTasksQueue::new(cloud_tasks.clone())))
            }
            None => QueueBackend::Memory(Arc::new(InMemoryQueue::new().with_auto_create(true))),
        }
    }

    pub fn queue(&self) -> Arc<dyn TaskQueue> {
        match self {
            QueueBackend::CloudTasks(queue) => queue.clone(),
            QueueBackend::Memory(queue) => queue.clone(),
        }
    }
}

pub fn build_resolver(config: &Config) -> QueueNameResolver {
    QueueNameResolver::new(&config.queues.default_queue)
        .with_business_unit(config.queues.business_unit.clone())
        .with_solution_code(config.queues.solution_code.clone())
}

pub fn build_store(config: &Config) -> (Arc<FilePipelineSource>, Arc<CachedConfigStore>) {
    let source = Arc::new(FilePipelineSource::new(&config.store.pipelines_dir));
    let store = Arc::new(CachedConfigStore::new(
        source.clone(),
        Arc::new(TtlCache::new(config.store.cache_ttl)),
    ));
    (source, store)
}

/// Remote executors for every task type with a configured service URL
pub fn build_executors(config: &Config) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    let endpoints = [
        (TaskType::Module, &config.executors.module_url),
        (TaskType::Prompt, &config.executors.prompt_url),
        (TaskType::Pipeline, &config.executors.pipeline_url),
    ];

    for (task_type, url) in endpoints {
        if let Some(url) = url {
            let name = format!("{}-service", task_type.as_str().to_lowercase());
            let executor =
                RemoteExecutor::new(&name, url).with_timeout(config.executors.timeout);
            registry.register(task_type, Arc::new(executor));
        }
    }

    registry
}

pub fn build_orchestrator(
    config: &Config,
    mode: ExecutionMode,
    queue: &QueueBackend,
) -> TaskOrchestrator {
    let (_, store) = build_store(config);
    let dispatcher = match mode {
        ExecutionMode::Local => Dispatcher::local(),
        ExecutionMode::Queued => Dispatcher::queued(build_resolver(config), queue.queue()),
    };

    let mut orchestrator = TaskOrchestrator::new(build_executors(config), store, dispatcher);
    if config.audit.enabled {
        orchestrator =
            orchestrator.with_audit_sink(Arc::new(LocalAuditSink::new(&config.audit.root_dir)));
    }
    if config.callbacks.enabled {
        orchestrator = orchestrator.with_callback_publisher(Arc::new(
            HttpCallbackPublisher::new().with_timeout(config.callbacks.timeout),
        ));
    }
    orchestrator
}

/// Start a pipeline run for one document
pub async fn run_pipeline(request: RunRequest, config: &Config) -> Result<()> {
    info!(
        "Starting pipeline {}/{} in {} mode (run_id: {})",
        request.seed.pipeline_scope, request.seed.pipeline_key, request.mode, request.seed.run_id
    );

    let backend = QueueBackend::from_config(config);
    let orchestrator = build_orchestrator(config, request.mode, &backend);

    let context = TaskContext {
        values: request.context,
        ..TaskContext::default()
    };
    let invocation = orchestrator
        .start_pipeline(request.seed, context)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start pipeline: {}", e))?;

    if let QueueBackend::Memory(ref queue) = backend {
        let held = queue.total_enqueued().await;
        if held > 0 {
            warn!(
                "{} continuation(s) held in memory; configure queues.cloud_tasks to deliver them",
                held
            );
        }
    }

    match invocation {
        Invocation::Enqueued { queue, params } => {
            println!(
                "Enqueued task '{}' on {} (run_id: {})",
                params.task_id(),
                queue,
                params.run_id
            );
            Ok(())
        }
        Invocation::Completed { params, results } => {
            let json_content = serde_json::to_string_pretty(&results)
                .map_err(|e| anyhow::anyhow!("Failed to serialize results to JSON: {}", e))?;

            match request.output {
                Some(path) => {
                    std::fs::write(&path, json_content).map_err(|e| {
                        anyhow::anyhow!("Failed to write output file '{}': {}", path.display(), e)
                    })?;
                    info!("Results written to: {}", path.display());
                }
                None => println!("{}", json_content),
            }

            if results.chain_succeeded() {
                Ok(())
            } else {
                Err(anyhow::anyhow!(
                    "Pipeline run {} finished with failed tasks",
                    params.run_id
                ))
            }
        }
    }
}

async fn load_pipeline(path: &Path) -> Result<PipelineConfig> {
    PipelineParser::new()
        .parse_file(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse pipeline '{}': {}", path.display(), e))
}

/// Validate, store, and provision queues for a pipeline definition
pub async fn publish_pipeline(
    path: PathBuf,
    app_id: &str,
    dry_run: bool,
    config: &Config,
) -> Result<()> {
    let pipeline = load_pipeline(&path).await?;
    let (source, store) = build_store(config);

    let backend = QueueBackend::from_config(config);
    let provisioner = QueueProvisioner::new(backend.queue())
        .with_rate_limits(config.queues.rate_limits.clone())
        .with_retry_policy(config.queues.retry.clone());
    let publisher =
        PipelinePublisher::new(source, store, build_resolver(config)).with_provisioner(provisioner);

    let report = if dry_run {
        publisher.dry_run(&pipeline, app_id).await?
    } else {
        publisher.publish(&pipeline, app_id).await?
    };

    for warning in &report.warnings {
        println!("⚠ {}", warning);
    }
    if report.dry_run {
        println!("✓ Pipeline '{}' is publishable (dry run)", report.pipeline_id);
    } else {
        println!(
            "✓ Published pipeline '{}' version {}",
            report.pipeline_id, report.version
        );
    }
    for queue in &report.queues {
        let status = if report.created.contains(queue) {
            "created"
        } else if report.existing.contains(queue) {
            "exists"
        } else {
            "planned"
        };
        println!("  {} ({})", queue, status);
    }

    Ok(())
}

/// Print the physical queues a pipeline can dispatch to
pub async fn list_queues(path: PathBuf, app_id: &str, config: &Config) -> Result<()> {
    let pipeline = load_pipeline(&path).await?;
    let (source, store) = build_store(config);
    let publisher = PipelinePublisher::new(source, store, build_resolver(config));

    for queue in publisher.queue_names(&pipeline, app_id) {
        println!("{}", queue);
    }
    Ok(())
}

/// Validate a pipeline file
pub async fn validate_pipeline(path: PathBuf, strict: bool) -> Result<()> {
    info!("Validating pipeline: {}", path.display());

    let pipeline = load_pipeline(&path).await?;
    let report = PipelineValidator::new()
        .with_strict_mode(strict)
        .validate(&pipeline);

    for warning in &report.warnings {
        println!("⚠ {}", warning);
    }

    if !report.is_valid {
        for error in report.error_messages() {
            println!("✗ {}", error);
        }
        return Err(anyhow::anyhow!(
            "Pipeline '{}' failed validation",
            pipeline.pipeline_id()
        ));
    }

    println!("✓ Pipeline '{}' is valid", pipeline.pipeline_id());
    println!("  Version: {}", pipeline.version);
    println!("  Tasks: {}", pipeline.tasks.len());
    Ok(())
}
