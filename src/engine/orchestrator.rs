// ABOUTME: Task orchestrator: executes one task and advances the pipeline
// ABOUTME: Merges results, persists audit files, computes successors, and dispatches them

use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::best_effort::{best_effort, log_failure};
use super::context::{merge_results, TaskContext};
use super::dispatcher::{Dispatcher, Invocation};
use super::error::{ExecutionError, Result};
use super::fanout::expand_for_pages;
use super::params::{Entities, PipelineParameters, TaskParameters};
use super::result::{DispatchRecord, TaskResults};
use crate::output::{audit_path, AuditFile, AuditSink, CallbackPayload, CallbackPublisher};
use crate::queue::QueueTarget;
use crate::store::PipelineConfigStore;
use crate::tasks::ExecutorRegistry;

pub struct TaskOrchestrator {
    executors: ExecutorRegistry,
    config_store: Arc<dyn PipelineConfigStore>,
    dispatcher: Dispatcher,
    audit: Option<Arc<dyn AuditSink>>,
    callbacks: Option<Arc<dyn CallbackPublisher>>,
}

impl TaskOrchestrator {
    pub fn new(
        executors: ExecutorRegistry,
        config_store: Arc<dyn PipelineConfigStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            executors,
            config_store,
            dispatcher,
            audit: None,
            callbacks: None,
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn with_callback_publisher(mut self, publisher: Arc<dyn CallbackPublisher>) -> Self {
        self.callbacks = Some(publisher);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Execute one task and advance the pipeline.
    ///
    /// Never fails: every error, including an unrecognized task type or a
    /// failed enqueue of a successor, comes back as `success = false` with an
    /// error message and `metadata.error`. Results are merged into the
    /// context before the audit write, so `params.json` includes them.
    #[instrument(
        skip(self, params),
        fields(run_id = %params.run_id, task_id = %params.task_config.id, page = ?params.page_number)
    )]
    pub async fn run(&self, params: TaskParameters) -> TaskResults {
        let task_id = params.task_id().to_string();

        match self.run_task(params).await {
            Ok(results) => results,
            Err(e) => self.handle_task_failure(&task_id, &e),
        }
    }

    /// Entry point for a continuation delivered by the queue
    pub async fn run_payload(&self, payload: &[u8]) -> TaskResults {
        match TaskParameters::from_json(payload) {
            Ok(params) => self.run(params).await,
            Err(e) => {
                let task_id = serde_json::from_slice::<serde_json::Value>(payload)
                    .ok()
                    .and_then(|v| {
                        v.pointer("/task_config/id")
                            .and_then(|id| id.as_str())
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| "unknown".to_string());
                self.handle_task_failure(&task_id, &e)
            }
        }
    }

    async fn run_task(&self, mut params: TaskParameters) -> Result<TaskResults> {
        info!(
            "Running task {} ({}) for document {}",
            params.task_id(),
            params
                .task_config
                .task_type()
                .map(|t| t.as_str())
                .unwrap_or("unrecognized"),
            params.identity.document_id
        );

        let mut results = self.execute(&params).await?;

        if !results.success {
            let message = results
                .error_message
                .clone()
                .unwrap_or_else(|| "task reported failure".to_string());
            warn!("Task {} failed: {}", params.task_id(), message);
            if results.error_metadata().is_none() {
                results.set_error_metadata("task_failed", &message, params.task_id());
            }
            results.error_message = Some(message);
            return Ok(results);
        }

        log_failure("context merge", merge_results(&mut params, &results));

        self.write_audit(&params, &results).await;

        self.publish_callback(&params, &results).await;

        let successors = self.determine_next(&params, &results).await;
        let mut dispatched = Vec::with_capacity(successors.len());
        for next in successors {
            let invocation = self.invoke(next).await?;
            let next = invocation.params();
            dispatched.push(match &invocation {
                Invocation::Completed { results, .. } => DispatchRecord::completed(
                    next.task_id(),
                    next.page_number,
                    invocation.queue(),
                    results,
                ),
                Invocation::Enqueued { queue, .. } => {
                    DispatchRecord::enqueued(next.task_id(), next.page_number, queue)
                }
            });
        }

        info!(
            "Task {} completed, {} successor(s) dispatched",
            params.task_id(),
            dispatched.len()
        );
        results.record_next_tasks(&dispatched);
        Ok(results)
    }

    async fn execute(&self, params: &TaskParameters) -> Result<TaskResults> {
        let task_type =
            params
                .task_config
                .task_type()
                .ok_or_else(|| ExecutionError::UnsupportedTaskType {
                    task_id: params.task_id().to_string(),
                })?;

        let executor =
            self.executors
                .get(task_type)
                .ok_or_else(|| ExecutionError::ExecutorNotRegistered {
                    task_type: task_type.to_string(),
                })?;

        debug!("Executing task {} with {}", params.task_id(), executor.name());
        executor.run(params).await
    }

    /// Successors of the task that produced `results`.
    ///
    /// Lookup failures are logged and yield no successors.
    pub async fn determine_next(
        &self,
        params: &TaskParameters,
        results: &TaskResults,
    ) -> Vec<TaskParameters> {
        match self.try_determine_next(params, results).await {
            Ok(successors) => successors,
            Err(e) => {
                error!(
                    "Failed to determine next tasks after {} in run {}: {}",
                    params.task_id(),
                    params.run_id,
                    e
                );
                Vec::new()
            }
        }
    }

    async fn try_determine_next(
        &self,
        params: &TaskParameters,
        results: &TaskResults,
    ) -> Result<Vec<TaskParameters>> {
        let pipeline = match self
            .config_store
            .get_pipeline_config(&params.pipeline_scope, &params.pipeline_key)
            .await?
        {
            Some(pipeline) => pipeline,
            None => {
                warn!(
                    "Pipeline {}/{} not found; no successors for {}",
                    params.pipeline_scope,
                    params.pipeline_key,
                    params.task_id()
                );
                return Ok(Vec::new());
            }
        };

        let index = match pipeline.find_task_index(params.task_id()) {
            Some(index) => index,
            None => {
                warn!(
                    "Task {} is not part of pipeline {}",
                    params.task_id(),
                    pipeline.pipeline_id()
                );
                return Ok(Vec::new());
            }
        };

        let next = match pipeline.tasks.get(index + 1) {
            Some(next) => next,
            None => {
                debug!("Task {} is the last task of {}", params.task_id(), pipeline.pipeline_id());
                return Ok(Vec::new());
            }
        };

        if params.task_config.fans_out_per_page() {
            match results.pages().filter(|_| results.success) {
                Some(pages) => {
                    let successors = expand_for_pages(
                        &params.pipeline(),
                        next,
                        pages,
                        &params.context,
                        &params.entities,
                    );
                    debug!(
                        "Task {} fanned out into {} page task(s)",
                        params.task_id(),
                        successors.len()
                    );
                    return Ok(successors);
                }
                None => warn!(
                    "Task {} fans out per page but returned no page list; continuing with one successor",
                    params.task_id()
                ),
            }
        }

        Ok(vec![params.successor(next)])
    }

    /// Run in-process or enqueue a continuation. Enqueue failures are returned.
    pub fn invoke(&self, params: TaskParameters) -> BoxFuture<'_, Result<Invocation>> {
        Box::pin(async move {
            match self.dispatcher.route(&params)? {
                QueueTarget::Direct => {
                    let results = self.run(params.clone()).await;
                    Ok(Invocation::Completed { params, results })
                }
                QueueTarget::Queue(queue) => {
                    self.dispatcher.enqueue(&queue, &params).await?;
                    Ok(Invocation::Enqueued { queue, params })
                }
            }
        })
    }

    /// Bind the first task of the seed's pipeline to `context` and invoke it
    pub async fn start_pipeline(
        &self,
        seed: PipelineParameters,
        context: TaskContext,
    ) -> Result<Invocation> {
        let pipeline = self
            .config_store
            .get_pipeline_config(&seed.pipeline_scope, &seed.pipeline_key)
            .await?
            .ok_or_else(|| ExecutionError::PipelineNotFound {
                scope: seed.pipeline_scope.clone(),
                key: seed.pipeline_key.clone(),
            })?;

        let first = pipeline
            .first_task()
            .ok_or_else(|| ExecutionError::EmptyPipeline {
                scope: seed.pipeline_scope.clone(),
                key: seed.pipeline_key.clone(),
            })?;

        info!(
            "Starting pipeline {} for document {} (run_id: {})",
            pipeline.pipeline_id(),
            seed.identity.document_id,
            seed.run_id
        );
        self.invoke(seed.bind_with(first.clone(), None, context, Entities::new()))
            .await
    }

    fn handle_task_failure(&self, task_id: &str, err: &ExecutionError) -> TaskResults {
        error!("Task {} failed ({}): {}", task_id, err.kind(), err);
        TaskResults::with_error(err.kind(), err.to_string(), task_id)
    }

    async fn write_audit(&self, params: &TaskParameters, results: &TaskResults) {
        let sink = match self.audit {
            Some(ref sink) => sink,
            None => return,
        };

        for file in AuditFile::ALL {
            let body = match file {
                AuditFile::Params => serde_json::to_vec_pretty(params),
                AuditFile::Output => serde_json::to_vec_pretty(&results.results),
                AuditFile::Results => serde_json::to_vec_pretty(results),
            };
            let body = match log_failure("audit serialization", body) {
                Some(body) => body,
                None => continue,
            };
            best_effort("audit write", async {
                sink.write(&audit_path(params, file)?, &body).await
            })
            .await;
        }
    }

    async fn publish_callback(&self, params: &TaskParameters, results: &TaskResults) {
        let (publisher, callback) = match (&self.callbacks, params.task_config.callback_enabled()) {
            (Some(publisher), Some(callback)) => (publisher, callback),
            _ => return,
        };

        let payload = CallbackPayload::build(params, results, callback.embed_entities);
        best_effort(
            "result callback",
            publisher.publish(&callback.endpoint, &payload),
        )
        .await;
    }
}
