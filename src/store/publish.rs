// ABOUTME: One-time pipeline publishing: validate, store, invalidate, and provision queues
// ABOUTME: Pre-creates every physical queue a pipeline's invoke templates can resolve to

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{Result, StoreError};
use super::source::PipelineSource;
use super::PipelineConfigStore;
use crate::parser::{PipelineConfig, PipelineValidator};
use crate::queue::{expand_queue_templates, QueueNameResolver, QueueProvisioner};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub pipeline_id: String,
    pub version: String,
    pub queues: Vec<String>,
    pub created: Vec<String>,
    pub existing: Vec<String>,
    pub warnings: Vec<String>,
    pub dry_run: bool,
}

pub struct PipelinePublisher {
    source: Arc<dyn PipelineSource>,
    store: Arc<dyn PipelineConfigStore>,
    resolver: QueueNameResolver,
    provisioner: Option<QueueProvisioner>,
    validator: PipelineValidator,
}

impl PipelinePublisher {
    pub fn new(
        source: Arc<dyn PipelineSource>,
        store: Arc<dyn PipelineConfigStore>,
        resolver: QueueNameResolver,
    ) -> Self {
        Self {
            source,
            store,
            resolver,
            provisioner: None,
            validator: PipelineValidator::new(),
        }
    }

    /// Without a provisioner, queues are only expanded and reported
    pub fn with_provisioner(mut self, provisioner: QueueProvisioner) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn with_validator(mut self, validator: PipelineValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Physical queues the pipeline can dispatch to for `app_id`
    pub fn queue_names(&self, pipeline: &PipelineConfig, app_id: &str) -> Vec<String> {
        let values = self
            .resolver
            .token_values(app_id, &pipeline.scope, &pipeline.key);
        expand_queue_templates(&pipeline.invoke_templates(), &values)
    }

    pub async fn publish(&self, pipeline: &PipelineConfig, app_id: &str) -> Result<PublishReport> {
        self.publish_inner(pipeline, app_id, false).await
    }

    /// Validate and expand queues without saving or provisioning
    pub async fn dry_run(&self, pipeline: &PipelineConfig, app_id: &str) -> Result<PublishReport> {
        self.publish_inner(pipeline, app_id, true).await
    }

    async fn publish_inner(
        &self,
        pipeline: &PipelineConfig,
        app_id: &str,
        dry_run: bool,
    ) -> Result<PublishReport> {
        let validation = self.validator.validate(pipeline);
        if !validation.is_valid {
            return Err(StoreError::Invalid {
                scope: pipeline.scope.clone(),
                key: pipeline.key.clone(),
                errors: validation
                    .error_messages()
                    .into_iter()
                    .chain(validation.warnings.iter().cloned())
                    .collect(),
            });
        }
        for warning in &validation.warnings {
            warn!("{}", warning);
        }

        let mut report = PublishReport {
            pipeline_id: pipeline.pipeline_id(),
            version: pipeline.version.clone(),
            queues: self.queue_names(pipeline, app_id),
            warnings: validation.warnings.clone(),
            dry_run,
            ..PublishReport::default()
        };

        if dry_run {
            return Ok(report);
        }

        self.source.save(pipeline).await?;
        self.store.invalidate(&pipeline.scope, &pipeline.key);
        info!(
            "Published pipeline {} version {}",
            report.pipeline_id, report.version
        );

        if let Some(ref provisioner) = self.provisioner {
            let provisioned = provisioner.ensure_all(&report.queues).await?;
            report.created = provisioned.created;
            report.existing = provisioned.existing;
            info!(
                "Provisioned queues for {}: {} created, {} existing",
                report.pipeline_id,
                report.created.len(),
                report.existing.len()
            );
        }

        Ok(report)
    }
}
