// ABOUTME: Integration tests for the task orchestrator
// ABOUTME: Tests sequencing, page fan-out, context merging, audit, callbacks, and queued dispatch

use serde_json::{json, Value};
use std::sync::Arc;

use docpipe::engine::{
    Dispatcher, Invocation, PipelineParameters, TaskContext, TaskOrchestrator, TaskOutcome,
    TaskResults,
};
use docpipe::output::MemoryAuditSink;
use docpipe::parser::{PipelineConfig, TaskConfig, TaskKind};
use docpipe::queue::{InMemoryQueue, QueueNameResolver};

mod common;
use common::{
    registry_for, results, seed, store_with, FailingAuditSink, FailingExecutor,
    RecordingCallbackPublisher, ScriptedExecutor, TestPipelineBuilder, KEY, SCOPE,
};

fn local_orchestrator(pipeline: PipelineConfig, executor: Arc<ScriptedExecutor>) -> TaskOrchestrator {
    TaskOrchestrator::new(registry_for(executor), store_with(vec![pipeline]), Dispatcher::local())
}

fn completed(invocation: Invocation) -> TaskResults {
    match invocation {
        Invocation::Completed { results, .. } => results,
        Invocation::Enqueued { queue, .. } => panic!("expected in-process run, enqueued on {}", queue),
    }
}

fn fan_out_pipeline() -> PipelineConfig {
    TestPipelineBuilder::new(SCOPE, KEY)
        .with_task(TaskConfig::module("split", "splitter").for_each_page())
        .add_prompt_task("extract", "Extract diagnoses")
        .build()
}

#[tokio::test]
async fn test_last_task_has_no_successors() {
    let executor = Arc::new(ScriptedExecutor::new());
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .build();
    let orchestrator = local_orchestrator(pipeline, executor.clone());

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert!(results.success);
    assert_eq!(results.next_task_count(), 0);
    assert_eq!(executor.calls().await.len(), 1);
}

#[tokio::test]
async fn test_sequential_tasks_run_in_order() {
    let executor = Arc::new(ScriptedExecutor::new());
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .add_module_task("classify")
        .add_prompt_task("summarize", "Summarize the document")
        .build();
    let orchestrator = local_orchestrator(pipeline, executor.clone());

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    let order: Vec<String> = executor
        .calls()
        .await
        .iter()
        .map(|p| p.task_id().to_string())
        .collect();
    assert_eq!(order, vec!["ocr", "classify", "summarize"]);
    assert!(results.chain_succeeded());

    let records = results.dispatch_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].task_id, "classify");
    assert_eq!(records[0].queue, "DIRECT");
    assert_eq!(records[0].outcome, Some(TaskOutcome::Success));
}

#[tokio::test]
async fn test_fan_out_creates_one_successor_per_page() {
    let executor = Arc::new(ScriptedExecutor::new().respond(
        "split",
        results(json!({
            "pages": [
                { "page_number": 1, "storage_uri": "gs://docs/doc-1/1.pdf" },
                { "page_number": 2, "storage_uri": "gs://docs/doc-1/2.pdf" }
            ]
        })),
    ));
    let orchestrator = local_orchestrator(fan_out_pipeline(), executor.clone());

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert_eq!(results.next_task_count(), 2);

    let extracts = executor.calls_for("extract").await;
    assert_eq!(extracts.len(), 2);
    assert_eq!(extracts[0].page_number, Some(1));
    assert_eq!(extracts[1].page_number, Some(2));
    assert_eq!(
        extracts[0].context.page_storage_uri.as_deref(),
        Some("gs://docs/doc-1/1.pdf")
    );
    assert_eq!(
        extracts[1]
            .context
            .page_info
            .as_ref()
            .and_then(|p| p.page_number),
        Some(2)
    );
    assert_eq!(extracts[0].run_id, extracts[1].run_id);
}

#[tokio::test]
async fn test_fan_out_skips_pages_without_page_number() {
    let executor = Arc::new(ScriptedExecutor::new().respond(
        "split",
        results(json!({
            "pages": [
                { "page_number": 3 },
                { "storage_uri": "gs://docs/doc-1/unnumbered.pdf" }
            ]
        })),
    ));
    let orchestrator = local_orchestrator(fan_out_pipeline(), executor.clone());

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert_eq!(results.next_task_count(), 1);
    let extracts = executor.calls_for("extract").await;
    assert_eq!(extracts.len(), 1);
    assert_eq!(extracts[0].page_number, Some(3));
}

#[tokio::test]
async fn test_fan_out_without_pages_continues_with_one_successor() {
    let executor = Arc::new(ScriptedExecutor::new().respond("split", results(json!({}))));
    let orchestrator = local_orchestrator(fan_out_pipeline(), executor.clone());

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert_eq!(results.next_task_count(), 1);
    let extracts = executor.calls_for("extract").await;
    assert_eq!(extracts.len(), 1);
    assert_eq!(extracts[0].page_number, None);
}

#[tokio::test]
async fn test_page_scope_carries_through_later_tasks() {
    let executor = Arc::new(ScriptedExecutor::new().respond(
        "split",
        results(json!({ "pages": [{ "page_number": 7 }] })),
    ));
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .with_task(TaskConfig::module("split", "splitter").for_each_page())
        .add_module_task("extract")
        .add_module_task("normalize")
        .build();
    let orchestrator = local_orchestrator(pipeline, executor.clone());

    orchestrator
        .start_pipeline(seed(), TaskContext::default())
        .await
        .unwrap();

    let normalize = executor.calls_for("normalize").await;
    assert_eq!(normalize.len(), 1);
    assert_eq!(normalize[0].page_number, Some(7));
    assert_eq!(normalize[0].dedupe_key(), "run-1-normalize-7");
}

#[tokio::test]
async fn test_unrecognized_task_type_fails_with_message() {
    let executor = Arc::new(ScriptedExecutor::new());
    let task = TaskConfig::with_kind("mystery", TaskKind::Unknown);
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .with_task(task.clone())
        .build();
    let orchestrator = local_orchestrator(pipeline, executor.clone());

    let results = orchestrator.run(seed().bind(task)).await;

    assert!(!results.success);
    assert!(results.error_message.unwrap().contains("mystery"));
    let error = results.metadata.get("error").unwrap();
    assert_eq!(error["type"], "unsupported_task_type");
    assert_eq!(error["task_id"], "mystery");
    assert!(executor.calls().await.is_empty());
}

#[tokio::test]
async fn test_context_holds_copy_of_predecessor_results() {
    let ocr_results = json!({ "text": "Patient presents with...", "confidence": 0.93 });
    let executor =
        Arc::new(ScriptedExecutor::new().respond("ocr", results(ocr_results.clone())));
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .add_module_task("classify")
        .build();
    let orchestrator = local_orchestrator(pipeline, executor.clone());

    orchestrator
        .start_pipeline(seed(), TaskContext::default())
        .await
        .unwrap();

    let classify = executor.calls_for("classify").await;
    assert_eq!(classify[0].context.get("ocr"), Some(&ocr_results));
}

#[tokio::test]
async fn test_seed_context_reaches_first_task() {
    let executor = Arc::new(ScriptedExecutor::new());
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .build();
    let orchestrator = local_orchestrator(pipeline, executor.clone());

    let mut context = TaskContext::default();
    context.insert("source", json!("fax"));
    orchestrator.start_pipeline(seed(), context).await.unwrap();

    let ocr = executor.calls_for("ocr").await;
    assert_eq!(ocr[0].context.get("source"), Some(&json!("fax")));
}

#[tokio::test]
async fn test_entities_are_wrapped_for_successors() {
    let executor = Arc::new(ScriptedExecutor::new().respond(
        "extract",
        results(json!({ "entities": [{ "code": "E11.9" }] })),
    ));
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .with_task(
            TaskConfig::prompt("extract", "Extract codes")
                .with_entity_schema("schemas/icd10.json", "entities"),
        )
        .add_module_task("store")
        .build();
    let orchestrator = local_orchestrator(pipeline, executor.clone());

    orchestrator
        .start_pipeline(seed(), TaskContext::default())
        .await
        .unwrap();

    let store = executor.calls_for("store").await;
    let wrapper = store[0].entity(SCOPE, KEY, "extract").unwrap();
    assert_eq!(wrapper.schema_ref, "schemas/icd10.json");
    assert_eq!(wrapper.run_id, "run-1");
    assert_eq!(wrapper.entities, json!([{ "code": "E11.9" }]));
}

#[tokio::test]
async fn test_executor_error_stops_the_chain() {
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .add_module_task("classify")
        .build();
    let orchestrator = TaskOrchestrator::new(
        registry_for(Arc::new(FailingExecutor)),
        store_with(vec![pipeline]),
        Dispatcher::local(),
    );

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert!(!results.success);
    assert!(!results.chain_succeeded());
    assert_eq!(results.next_task_count(), 0);
    assert_eq!(results.metadata["error"]["type"], "task_failed");
}

#[tokio::test]
async fn test_reported_failure_has_no_successors() {
    let executor = Arc::new(
        ScriptedExecutor::new().respond("ocr", TaskResults::failure("unreadable scan")),
    );
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .add_module_task("classify")
        .build();
    let orchestrator = local_orchestrator(pipeline, executor.clone());

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert!(!results.success);
    assert_eq!(results.error_message.as_deref(), Some("unreadable scan"));
    assert_eq!(results.metadata["error"]["message"], "unreadable scan");
    assert!(executor.calls_for("classify").await.is_empty());
}

#[tokio::test]
async fn test_failed_successor_fails_the_chain() {
    let executor = Arc::new(
        ScriptedExecutor::new().respond("classify", TaskResults::failure("model timeout")),
    );
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .add_module_task("classify")
        .build();
    let orchestrator = local_orchestrator(pipeline, executor);

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert!(results.success);
    assert!(!results.chain_succeeded());
    assert_eq!(
        results.dispatch_records()[0].outcome,
        Some(TaskOutcome::Failure)
    );
}

#[tokio::test]
async fn test_missing_pipeline_is_reported() {
    let orchestrator = local_orchestrator(
        TestPipelineBuilder::new("other", "pipeline")
            .add_module_task("ocr")
            .build(),
        Arc::new(ScriptedExecutor::new()),
    );

    let err = orchestrator
        .start_pipeline(seed(), TaskContext::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("clinical/intake"));
}

#[tokio::test]
async fn test_task_outside_pipeline_has_no_successors() {
    let executor = Arc::new(ScriptedExecutor::new());
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .build();
    let orchestrator = local_orchestrator(pipeline, executor);

    let results = orchestrator
        .run(seed().bind(TaskConfig::module("orphan", "orphan")))
        .await;

    assert!(results.success);
    assert_eq!(results.next_task_count(), 0);
}

#[tokio::test]
async fn test_audit_files_written_per_task() {
    let executor = Arc::new(ScriptedExecutor::new().respond("ocr", results(json!({ "text": "hi" }))));
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .build();
    let audit = Arc::new(MemoryAuditSink::new());
    let orchestrator = local_orchestrator(pipeline, executor).with_audit_sink(audit.clone());

    orchestrator
        .start_pipeline(seed(), TaskContext::default())
        .await
        .unwrap();

    let prefix = "app-1/tenant-1/patient-1/doc-1/run-1/document/clinical/intake/ocr";
    assert_eq!(
        audit.paths().await,
        vec![
            format!("{}/output.json", prefix),
            format!("{}/params.json", prefix),
            format!("{}/results.json", prefix),
        ]
    );

    let output: Value =
        serde_json::from_slice(&audit.get(&format!("{}/output.json", prefix)).await.unwrap())
            .unwrap();
    assert_eq!(output, json!({ "text": "hi" }));

    let params: Value =
        serde_json::from_slice(&audit.get(&format!("{}/params.json", prefix)).await.unwrap())
            .unwrap();
    assert_eq!(params["context"]["ocr"], json!({ "text": "hi" }));
}

#[tokio::test]
async fn test_audit_write_failure_does_not_fail_the_task() {
    let executor = Arc::new(ScriptedExecutor::new());
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .add_module_task("classify")
        .build();
    let audit = Arc::new(FailingAuditSink::new());
    let orchestrator = local_orchestrator(pipeline, executor.clone()).with_audit_sink(audit.clone());

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert!(results.success);
    assert_eq!(results.next_task_count(), 1);
    assert_eq!(executor.calls_for("classify").await.len(), 1);
    assert_eq!(audit.attempts.lock().await.len(), 6);
}

#[tokio::test]
async fn test_unsafe_identity_skips_audit_but_not_the_task() {
    let executor = Arc::new(ScriptedExecutor::new());
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .build();
    let audit = Arc::new(MemoryAuditSink::new());
    let orchestrator = local_orchestrator(pipeline, executor).with_audit_sink(audit.clone());
    let mut seed = seed();
    seed.identity.app_id = "../../escaped".to_string();

    let results = completed(
        orchestrator
            .start_pipeline(seed, TaskContext::default())
            .await
            .unwrap(),
    );

    assert!(results.success);
    assert!(audit.paths().await.is_empty());
}

#[tokio::test]
async fn test_missing_entity_variable_still_dispatches_successor() {
    let executor = Arc::new(
        ScriptedExecutor::new().respond("extract", results(json!({ "summary": "no codes" }))),
    );
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .with_task(
            TaskConfig::prompt("extract", "Extract codes")
                .with_entity_schema("schemas/icd10.json", "entities"),
        )
        .add_module_task("store")
        .build();
    let orchestrator = local_orchestrator(pipeline, executor.clone());

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert!(results.success);
    assert_eq!(results.next_task_count(), 1);
    let store = executor.calls_for("store").await;
    assert_eq!(store.len(), 1);
    assert!(store[0].entity(SCOPE, KEY, "extract").is_none());
}

#[tokio::test]
async fn test_callback_published_with_entities() {
    let executor = Arc::new(ScriptedExecutor::new().respond(
        "extract",
        results(json!({ "entities": { "allergies": ["penicillin"] } })),
    ));
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .with_task(
            TaskConfig::prompt("extract", "Extract allergies")
                .with_entity_schema("schemas/allergy.json", "entities")
                .with_callback("https://hooks.example.com/extract", true),
        )
        .build();
    let publisher = Arc::new(RecordingCallbackPublisher::new());
    let orchestrator =
        local_orchestrator(pipeline, executor).with_callback_publisher(publisher.clone());

    orchestrator
        .start_pipeline(seed(), TaskContext::default())
        .await
        .unwrap();

    let published = publisher.published.lock().await;
    assert_eq!(published.len(), 1);
    let (endpoint, payload) = &published[0];
    assert_eq!(endpoint, "https://hooks.example.com/extract");
    assert_eq!(payload.task_id, "extract");
    assert!(payload.success);
    assert_eq!(
        payload.entities.as_ref().map(|e| e.schema_ref.as_str()),
        Some("schemas/allergy.json")
    );
}

#[tokio::test]
async fn test_callback_failure_does_not_fail_task() {
    let executor = Arc::new(ScriptedExecutor::new());
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .with_task(TaskConfig::module("ocr", "ocr").with_callback("https://hooks.example.com", false))
        .add_module_task("classify")
        .build();
    let publisher = Arc::new(RecordingCallbackPublisher::failing());
    let orchestrator =
        local_orchestrator(pipeline, executor.clone()).with_callback_publisher(publisher.clone());

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert!(results.chain_succeeded());
    assert_eq!(publisher.published.lock().await.len(), 1);
    assert_eq!(executor.calls_for("classify").await.len(), 1);
}

fn queued_pipeline() -> PipelineConfig {
    TestPipelineBuilder::new(SCOPE, KEY)
        .with_task(TaskConfig::module("ocr", "ocr").with_invoke("DIRECT"))
        .with_task(TaskConfig::module("classify", "classifier").with_invoke("{app_id}-{priority}"))
        .build()
}

#[tokio::test]
async fn test_queued_mode_enqueues_continuation() {
    let executor = Arc::new(ScriptedExecutor::new());
    let queue = Arc::new(InMemoryQueue::new().with_auto_create(true));
    let orchestrator = TaskOrchestrator::new(
        registry_for(executor.clone()),
        store_with(vec![queued_pipeline()]),
        Dispatcher::queued(QueueNameResolver::new("docpipe-default"), queue.clone()),
    );

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    let records = results.dispatch_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].queue, "app-1-default");
    assert_eq!(records[0].outcome, None);
    assert!(executor.calls_for("classify").await.is_empty());

    let enqueued = queue.enqueued("app-1-default").await;
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].dedupe_key, "run-1-classify-document");
}

#[tokio::test]
async fn test_redelivered_run_does_not_duplicate_continuation() {
    let executor = Arc::new(ScriptedExecutor::new());
    let queue = Arc::new(InMemoryQueue::new().with_auto_create(true));
    let orchestrator = TaskOrchestrator::new(
        registry_for(executor.clone()),
        store_with(vec![queued_pipeline()]),
        Dispatcher::queued(QueueNameResolver::new("docpipe-default"), queue.clone()),
    );

    for _ in 0..2 {
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap();
    }

    assert_eq!(executor.calls_for("ocr").await.len(), 2);
    assert_eq!(queue.total_enqueued().await, 1);
}

#[tokio::test]
async fn test_enqueued_payload_resumes_the_run() {
    let ocr_results = json!({ "text": "resumed" });
    let executor = Arc::new(ScriptedExecutor::new().respond("ocr", results(ocr_results.clone())));
    let queue = Arc::new(InMemoryQueue::new().with_auto_create(true));
    let orchestrator = TaskOrchestrator::new(
        registry_for(executor.clone()),
        store_with(vec![queued_pipeline()]),
        Dispatcher::queued(QueueNameResolver::new("docpipe-default"), queue.clone()),
    );

    orchestrator
        .start_pipeline(seed(), TaskContext::default())
        .await
        .unwrap();

    let continuation = queue.take_enqueued("app-1-default").await.remove(0);
    let results = orchestrator.run_payload(&continuation.payload).await;

    assert!(results.success);
    let classify = executor.calls_for("classify").await;
    assert_eq!(classify.len(), 1);
    assert_eq!(classify[0].context.get("ocr"), Some(&ocr_results));
}

#[tokio::test]
async fn test_default_template_uses_configured_queue() {
    let pipeline = TestPipelineBuilder::new(SCOPE, KEY)
        .add_module_task("ocr")
        .build();
    let queue = Arc::new(InMemoryQueue::new().with_auto_create(true));
    let orchestrator = TaskOrchestrator::new(
        registry_for(Arc::new(ScriptedExecutor::new())),
        store_with(vec![pipeline]),
        Dispatcher::queued(QueueNameResolver::new("docpipe-default"), queue.clone()),
    );

    let invocation = orchestrator
        .start_pipeline(seed(), TaskContext::default())
        .await
        .unwrap();

    assert!(matches!(invocation, Invocation::Enqueued { ref queue, .. } if queue == "docpipe-default"));
    assert_eq!(queue.enqueued("docpipe-default").await.len(), 1);
}

#[tokio::test]
async fn test_enqueue_failure_becomes_dispatch_error() {
    let queue = Arc::new(InMemoryQueue::new());
    let orchestrator = TaskOrchestrator::new(
        registry_for(Arc::new(ScriptedExecutor::new())),
        store_with(vec![queued_pipeline()]),
        Dispatcher::queued(QueueNameResolver::new("docpipe-default"), queue),
    );

    let results = completed(
        orchestrator
            .start_pipeline(seed(), TaskContext::default())
            .await
            .unwrap(),
    );

    assert!(!results.success);
    assert_eq!(results.metadata["error"]["type"], "dispatch");
    assert_eq!(results.metadata["error"]["task_id"], "ocr");
}

#[tokio::test]
async fn test_undecodable_payload_fails_with_task_id() {
    let orchestrator = local_orchestrator(
        queued_pipeline(),
        Arc::new(ScriptedExecutor::new()),
    );

    let results = orchestrator
        .run_payload(br#"{"task_config": {"id": "classify"}}"#)
        .await;

    assert!(!results.success);
    assert_eq!(results.metadata["error"]["type"], "payload");
    assert_eq!(results.metadata["error"]["task_id"], "classify");
}

#[tokio::test]
async fn test_start_with_explicit_run_id_and_priority() {
    let executor = Arc::new(ScriptedExecutor::new());
    let orchestrator = local_orchestrator(
        TestPipelineBuilder::new(SCOPE, KEY)
            .add_module_task("ocr")
            .build(),
        executor.clone(),
    );
    let seed = PipelineParameters::new(common::identity(), SCOPE, KEY)
        .with_run_id("run-42")
        .with_priority("high".parse().unwrap());

    orchestrator
        .start_pipeline(seed, TaskContext::default())
        .await
        .unwrap();

    let ocr = executor.calls_for("ocr").await;
    assert_eq!(ocr[0].run_id, "run-42");
    assert_eq!(ocr[0].priority.as_str(), "high");
}
