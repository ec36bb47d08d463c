// ABOUTME: Injected get/set/invalidate cache for pipeline definitions
// ABOUTME: TTL cache implementation keyed by scope and pipeline key

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::parser::PipelineConfig;

pub trait ConfigCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<PipelineConfig>>;
    fn set(&self, key: &str, value: Arc<PipelineConfig>);
    fn invalidate(&self, key: &str);
}

pub fn cache_key(scope: &str, key: &str) -> String {
    format!("{}/{}", scope, key)
}

struct CacheEntry {
    value: Arc<PipelineConfig>,
    expires_at: Instant,
}

/// Entries expire `ttl` after they are set. The lock is never held across an await.
pub struct TtlCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigCache for TtlCache {
    fn get(&self, key: &str) -> Option<Arc<PipelineConfig>> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Arc<PipelineConfig>) {
        self.entries().insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    fn invalidate(&self, key: &str) {
        self.entries().remove(key);
    }
}
