// ABOUTME: Pipeline definition store: cached read-by-key lookup and publishing
// ABOUTME: Combines a backing source with an injected TTL cache invalidated on publish

pub mod cache;
pub mod error;
pub mod publish;
pub mod source;

pub use cache::{cache_key, ConfigCache, TtlCache};
pub use error::{Result, StoreError};
pub use publish::{PipelinePublisher, PublishReport};
pub use source::{FilePipelineSource, InMemoryPipelineSource, PipelineSource};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::parser::PipelineConfig;

#[async_trait]
pub trait PipelineConfigStore: Send + Sync {
    async fn get_pipeline_config(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<Arc<PipelineConfig>>>;

    fn invalidate(&self, scope: &str, key: &str);
}

pub struct CachedConfigStore {
    source: Arc<dyn PipelineSource>,
    cache: Arc<dyn ConfigCache>,
}

impl CachedConfigStore {
    pub fn new(source: Arc<dyn PipelineSource>, cache: Arc<dyn ConfigCache>) -> Self {
        Self { source, cache }
    }

    pub fn source(&self) -> Arc<dyn PipelineSource> {
        self.source.clone()
    }
}

#[async_trait]
impl PipelineConfigStore for CachedConfigStore {
    async fn get_pipeline_config(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<Arc<PipelineConfig>>> {
        let cache_key = cache_key(scope, key);
        if let Some(pipeline) = self.cache.get(&cache_key) {
            return Ok(Some(pipeline));
        }

        debug!("Pipeline cache miss for {}", cache_key);
        match self.source.load(scope, key).await? {
            Some(pipeline) => {
                let pipeline = Arc::new(pipeline);
                self.cache.set(&cache_key, pipeline.clone());
                Ok(Some(pipeline))
            }
            None => Ok(None),
        }
    }

    fn invalidate(&self, scope: &str, key: &str) {
        self.cache.invalidate(&cache_key(scope, key));
    }
}
