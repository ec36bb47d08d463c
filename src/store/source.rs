// ABOUTME: Backing sources for pipeline definitions read by key
// ABOUTME: Filesystem source laid out as scope/key.yaml and an in-memory source for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use super::cache::cache_key;
use super::error::{Result, StoreError};
use crate::parser::PipelineConfig;

#[async_trait]
pub trait PipelineSource: Send + Sync {
    /// `Ok(None)` when no definition is stored under `(scope, key)`
    async fn load(&self, scope: &str, key: &str) -> Result<Option<PipelineConfig>>;

    async fn save(&self, pipeline: &PipelineConfig) -> Result<()>;
}

pub struct FilePipelineSource {
    root: PathBuf,
}

impl FilePipelineSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pipeline_path(&self, scope: &str, key: &str, extension: &str) -> PathBuf {
        self.root.join(scope).join(format!("{}.{}", key, extension))
    }
}

#[async_trait]
impl PipelineSource for FilePipelineSource {
    async fn load(&self, scope: &str, key: &str) -> Result<Option<PipelineConfig>> {
        for extension in ["yaml", "yml", "json"] {
            let path = self.pipeline_path(scope, key, extension);
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::Io(e)),
            };

            debug!("Loading pipeline {}/{} from {}", scope, key, path.display());
            let parsed = if extension == "json" {
                PipelineConfig::from_json(&content)
            } else {
                PipelineConfig::from_yaml(&content)
            };
            return parsed.map(Some).map_err(|source| StoreError::Parse {
                scope: scope.to_string(),
                key: key.to_string(),
                source,
            });
        }

        Ok(None)
    }

    async fn save(&self, pipeline: &PipelineConfig) -> Result<()> {
        let path = self.pipeline_path(&pipeline.scope, &pipeline.key, "yaml");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_yaml::to_string(pipeline)?;
        fs::write(&path, content).await?;
        debug!("Saved pipeline {} to {}", pipeline.pipeline_id(), path.display());
        Ok(())
    }
}

/// Holds definitions in memory and counts loads so cache behaviour is observable.
#[derive(Default)]
pub struct InMemoryPipelineSource {
    pipelines: RwLock<HashMap<String, PipelineConfig>>,
    loads: AtomicUsize,
}

impl InMemoryPipelineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipelines(pipelines: Vec<PipelineConfig>) -> Self {
        let map = pipelines
            .into_iter()
            .map(|p| (cache_key(&p.scope, &p.key), p))
            .collect();
        Self {
            pipelines: RwLock::new(map),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineSource for InMemoryPipelineSource {
    async fn load(&self, scope: &str, key: &str) -> Result<Option<PipelineConfig>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let pipelines = self.pipelines.read().await;
        Ok(pipelines.get(&cache_key(scope, key)).cloned())
    }

    async fn save(&self, pipeline: &PipelineConfig) -> Result<()> {
        let mut pipelines = self.pipelines.write().await;
        pipelines.insert(cache_key(&pipeline.scope, &pipeline.key), pipeline.clone());
        Ok(())
    }
}
