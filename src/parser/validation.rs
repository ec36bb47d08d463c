// ABOUTME: Pipeline validation run before a definition is published or executed
// ABOUTME: Checks task payloads, reserved ids, queue templates, callbacks, and entity bindings

use std::collections::HashSet;

use super::error::ValidationError;
use super::pipeline::PipelineConfig;
use super::task::{TaskConfig, TaskKind, TaskType};
use crate::engine::context::RESERVED_CONTEXT_KEYS;
use crate::queue::resolver::{is_pseudo_queue, template_tokens, KNOWN_TOKENS};

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub is_valid: bool,
}

pub struct PipelineValidator {
    strict_mode: bool,
}

impl PipelineValidator {
    pub fn new() -> Self {
        Self { strict_mode: false }
    }

    /// In strict mode warnings also make the report invalid
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn validate(&self, pipeline: &PipelineConfig) -> ValidationReport {
        let mut report = ValidationReport::new();

        if pipeline.tasks.is_empty() {
            report.errors.push(ValidationError::EmptyPipeline);
        }

        let mut seen = HashSet::new();
        for task in &pipeline.tasks {
            if !seen.insert(task.id.as_str()) {
                report.errors.push(ValidationError::DuplicateTask {
                    task: task.id.clone(),
                });
            }
            self.validate_task(task, &mut report);
        }

        if let Some(last) = pipeline.tasks.last() {
            if last.fans_out_per_page() {
                report.warnings.push(format!(
                    "Task '{}' fans out per page but is the last task; the pages will not be used",
                    last.id
                ));
            }
        }

        report.is_valid = report.errors.is_empty()
            && (!self.strict_mode || report.warnings.is_empty());
        report
    }

    fn validate_task(&self, task: &TaskConfig, report: &mut ValidationReport) {
        if task.id.trim().is_empty() {
            report.errors.push(ValidationError::InvalidTaskConfig {
                task: task.id.clone(),
                reason: "task id cannot be empty".to_string(),
            });
        }

        if RESERVED_CONTEXT_KEYS.contains(&task.id.as_str()) {
            report.errors.push(ValidationError::ReservedTaskId {
                task: task.id.clone(),
            });
        }

        match &task.kind {
            TaskKind::Module { module } => {
                if module.name.trim().is_empty() {
                    report.errors.push(invalid(task, "module name cannot be empty"));
                }
            }
            TaskKind::Prompt { prompt } => {
                if prompt.template.trim().is_empty() {
                    report.errors.push(invalid(task, "prompt template cannot be empty"));
                }
            }
            TaskKind::Pipeline { pipelines } => {
                if pipelines.is_empty() {
                    report
                        .errors
                        .push(invalid(task, "at least one sub-pipeline is required"));
                }
                for reference in pipelines {
                    if reference.scope.trim().is_empty() || reference.key.trim().is_empty() {
                        report
                            .errors
                            .push(invalid(task, "sub-pipeline scope and key are required"));
                    }
                }
            }
            TaskKind::Unknown => {
                report.errors.push(ValidationError::UnsupportedTaskType {
                    task: task.id.clone(),
                    supported_types: TaskType::ALL
                        .iter()
                        .map(|t| t.as_str().to_string())
                        .collect(),
                });
            }
        }

        if let Some(ref template) = task.invoke {
            self.validate_queue_template(task, template, report);
        }

        if let Some(ref callback) = task.callback {
            if callback.enabled && callback.endpoint.trim().is_empty() {
                report
                    .errors
                    .push(invalid(task, "enabled callback requires an endpoint"));
            }
            if callback.embed_entities && task.entity_schema.is_none() {
                report.warnings.push(format!(
                    "Task '{}' embeds entities in its callback but declares no entity schema",
                    task.id
                ));
            }
        }

        if let Some(ref schema) = task.entity_schema {
            if schema.uri.trim().is_empty() {
                report.errors.push(invalid(task, "entity schema uri cannot be empty"));
            }
            if schema.variable.trim().is_empty() {
                report
                    .errors
                    .push(invalid(task, "entity schema variable cannot be empty"));
            }
        }
    }

    fn validate_queue_template(
        &self,
        task: &TaskConfig,
        template: &str,
        report: &mut ValidationReport,
    ) {
        if is_pseudo_queue(template) {
            return;
        }

        if template.trim().is_empty() {
            report.errors.push(ValidationError::InvalidQueueTemplate {
                task: task.id.clone(),
                template: template.to_string(),
                reason: "template cannot be empty".to_string(),
            });
            return;
        }

        let tokens = match template_tokens(template) {
            Ok(tokens) => tokens,
            Err(reason) => {
                report.errors.push(ValidationError::InvalidQueueTemplate {
                    task: task.id.clone(),
                    template: template.to_string(),
                    reason,
                });
                return;
            }
        };

        for token in tokens {
            if !KNOWN_TOKENS.contains(&token.as_str()) {
                report.errors.push(ValidationError::InvalidQueueTemplate {
                    task: task.id.clone(),
                    template: template.to_string(),
                    reason: format!("unknown token '{{{}}}'", token),
                });
            }
        }
    }
}

fn invalid(task: &TaskConfig, reason: &str) -> ValidationError {
    ValidationError::InvalidTaskConfig {
        task: task.id.clone(),
        reason: reason.to_string(),
    }
}

impl Default for PipelineValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            is_valid: true,
        }
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::task::PipelineRef;

    fn pipeline(tasks: Vec<TaskConfig>) -> PipelineConfig {
        PipelineConfig::new("clinical", "intake", tasks)
    }

    #[test]
    fn test_valid_pipeline() {
        let report = PipelineValidator::new().validate(&pipeline(vec![
            TaskConfig::module("split", "pdf-split")
                .for_each_page()
                .with_invoke("split-{priority}-{app_id}"),
            TaskConfig::prompt("extract", "Extract").with_invoke("DIRECT"),
        ]));

        assert!(report.is_valid, "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let report = PipelineValidator::new().validate(&pipeline(vec![TaskConfig::with_kind(
            "mystery",
            TaskKind::Unknown,
        )]));

        assert!(!report.is_valid);
        assert!(matches!(
            report.errors[0],
            ValidationError::UnsupportedTaskType { .. }
        ));
    }

    #[test]
    fn test_unknown_queue_token_rejected() {
        let report = PipelineValidator::new().validate(&pipeline(vec![
            TaskConfig::module("ocr", "ocr").with_invoke("ocr-{region}"),
        ]));

        assert!(!report.is_valid);
        assert!(report.error_messages()[0].contains("region"));
    }

    #[test]
    fn test_malformed_queue_templates_rejected() {
        let report = PipelineValidator::new().validate(&pipeline(vec![
            TaskConfig::module("ocr", "ocr").with_invoke("ocr-{ priority }"),
            TaskConfig::module("classify", "classifier").with_invoke("q-}{app_id"),
        ]));

        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 2);
        assert!(report.error_messages()[0].contains("whitespace"));
        assert!(report.error_messages()[1].contains("unbalanced braces"));
    }

    #[test]
    fn test_reserved_task_id_rejected() {
        let report = PipelineValidator::new()
            .validate(&pipeline(vec![TaskConfig::module("page_info", "ocr")]));

        assert!(!report.is_valid);
        assert_eq!(
            report.errors[0],
            ValidationError::ReservedTaskId {
                task: "page_info".to_string()
            }
        );
    }

    #[test]
    fn test_empty_sub_pipeline_reference_rejected() {
        let report = PipelineValidator::new().validate(&pipeline(vec![TaskConfig::with_kind(
            "nested",
            TaskKind::Pipeline {
                pipelines: vec![PipelineRef {
                    scope: "clinical".to_string(),
                    key: String::new(),
                }],
            },
        )]));

        assert!(!report.is_valid);
    }

    #[test]
    fn test_trailing_fan_out_is_warning_in_strict_mode() {
        let tasks = vec![TaskConfig::module("split", "pdf-split").for_each_page()];

        let lenient = PipelineValidator::new().validate(&pipeline(tasks.clone()));
        assert!(lenient.is_valid);
        assert_eq!(lenient.warnings.len(), 1);

        let strict = PipelineValidator::new()
            .with_strict_mode(true)
            .validate(&pipeline(tasks));
        assert!(!strict.is_valid);
    }
}
