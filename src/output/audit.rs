// ABOUTME: Audit persistence of task inputs and outputs under a document-scoped path
// ABOUTME: Local filesystem sink standing in for object storage plus an in-memory sink

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::{OutputError, Result};
use crate::engine::params::TaskParameters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditFile {
    Params,
    Output,
    Results,
}

impl AuditFile {
    pub const ALL: [AuditFile; 3] = [AuditFile::Params, AuditFile::Output, AuditFile::Results];

    pub fn file_name(&self) -> &'static str {
        match self {
            AuditFile::Params => "params.json",
            AuditFile::Output => "output.json",
            AuditFile::Results => "results.json",
        }
    }
}

/// `{app}/{tenant}/{patient}/{document}/{run}/{page|document}/{scope}/{key}/{task}/{file}`
///
/// Every segment must be a single non-empty path component.
pub fn audit_path(params: &TaskParameters, file: AuditFile) -> Result<String> {
    let identity = &params.identity;
    let scope_label = params.scope_label();
    let segments = [
        ("app_id", identity.app_id.as_str()),
        ("tenant_id", identity.tenant_id.as_str()),
        ("patient_id", identity.patient_id.as_str()),
        ("document_id", identity.document_id.as_str()),
        ("run_id", params.run_id.as_str()),
        ("scope", params.pipeline_scope.as_str()),
        ("pipeline_key", params.pipeline_key.as_str()),
        ("task_id", params.task_id()),
    ];

    for (field, segment) in segments {
        if segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains(['/', '\\'])
        {
            return Err(OutputError::WriteError {
                message: format!("Invalid audit path segment for {}: {:?}", field, segment),
            });
        }
    }

    Ok([
        identity.app_id.as_str(),
        identity.tenant_id.as_str(),
        identity.patient_id.as_str(),
        identity.document_id.as_str(),
        params.run_id.as_str(),
        scope_label.as_str(),
        params.pipeline_scope.as_str(),
        params.pipeline_key.as_str(),
        params.task_id(),
        file.file_name(),
    ]
    .join("/"))
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, path: &str, body: &[u8]) -> Result<()>;
}

pub struct LocalAuditSink {
    root: PathBuf,
}

impl LocalAuditSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl AuditSink for LocalAuditSink {
    async fn write(&self, path: &str, body: &[u8]) -> Result<()> {
        let relative = Path::new(path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(OutputError::WriteError {
                message: format!("Audit path escapes the audit root: {}", path),
            });
        }
        let target = self.root.join(relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| OutputError::WriteError {
                    message: format!("Failed to create directory {}: {}", parent.display(), e),
                })?;
        }

        fs::write(&target, body)
            .await
            .map_err(|e| OutputError::WriteError {
                message: format!("Failed to write {}: {}", target.display(), e),
            })?;

        debug!("Audit written to {} ({} bytes)", target.display(), body.len());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().await.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, path: &str, body: &[u8]) -> Result<()> {
        self.objects
            .lock()
            .await
            .insert(path.to_string(), body.to_vec());
        Ok(())
    }
}
