// ABOUTME: In-process task queue used for tests and local queued-mode runs
// ABOUTME: Records queues and continuations and drops duplicate dedupe keys

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

use super::error::{QueueError, Result};
use super::provisioner::{RateLimits, RetryPolicy};
use super::{EnqueuedTask, QueueInfo, TaskQueue};

#[derive(Debug, Default)]
struct QueueState {
    rate_limits: RateLimits,
    retry: RetryPolicy,
    tasks: Vec<EnqueuedTask>,
    keys: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    auto_create: bool,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create queues on first enqueue instead of failing with `NotFound`
    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    pub async fn queue_names(&self) -> Vec<String> {
        let queues = self.queues.lock().await;
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn rate_limits(&self, name: &str) -> Option<(RateLimits, RetryPolicy)> {
        let queues = self.queues.lock().await;
        queues
            .get(name)
            .map(|q| (q.rate_limits.clone(), q.retry.clone()))
    }

    /// Continuations currently held by `name`, oldest first
    pub async fn enqueued(&self, name: &str) -> Vec<EnqueuedTask> {
        let queues = self.queues.lock().await;
        queues
            .get(name)
            .map(|q| q.tasks.clone())
            .unwrap_or_default()
    }

    /// Remove and return everything held by `name`.
    ///
    /// Dedupe keys are kept, so a redelivered duplicate is still dropped.
    pub async fn take_enqueued(&self, name: &str) -> Vec<EnqueuedTask> {
        let mut queues = self.queues.lock().await;
        queues
            .get_mut(name)
            .map(|q| std::mem::take(&mut q.tasks))
            .unwrap_or_default()
    }

    pub async fn total_enqueued(&self) -> usize {
        let queues = self.queues.lock().await;
        queues.values().map(|q| q.tasks.len()).sum()
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn get_queue(&self, name: &str) -> Result<QueueInfo> {
        // Let concurrent provisioners interleave between check and create
        tokio::task::yield_now().await;

        let queues = self.queues.lock().await;
        if queues.contains_key(name) {
            Ok(QueueInfo {
                name: name.to_string(),
            })
        } else {
            Err(QueueError::NotFound {
                name: name.to_string(),
            })
        }
    }

    async fn create_queue(
        &self,
        name: &str,
        rate_limits: &RateLimits,
        retry: &RetryPolicy,
    ) -> Result<QueueInfo> {
        let mut queues = self.queues.lock().await;
        if queues.contains_key(name) {
            return Err(QueueError::AlreadyExists {
                name: name.to_string(),
            });
        }

        queues.insert(
            name.to_string(),
            QueueState {
                rate_limits: rate_limits.clone(),
                retry: retry.clone(),
                ..QueueState::default()
            },
        );
        Ok(QueueInfo {
            name: name.to_string(),
        })
    }

    async fn enqueue_task(&self, queue: &str, task: EnqueuedTask) -> Result<()> {
        let mut queues = self.queues.lock().await;

        if !queues.contains_key(queue) {
            if !self.auto_create {
                return Err(QueueError::NotFound {
                    name: queue.to_string(),
                });
            }
            queues.insert(queue.to_string(), QueueState::default());
        }

        let state = queues.get_mut(queue).ok_or_else(|| QueueError::NotFound {
            name: queue.to_string(),
        })?;

        if !state.keys.insert(task.dedupe_key.clone()) {
            debug!("Dropping duplicate task {} on queue {}", task.dedupe_key, queue);
            return Ok(());
        }

        state.tasks.push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(key: &str) -> EnqueuedTask {
        EnqueuedTask {
            dedupe_key: key.to_string(),
            payload: b"{}".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_requires_existing_queue() {
        let queue = InMemoryQueue::new();
        let err = queue.enqueue_task("missing", task("k")).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound { .. }));

        let auto = InMemoryQueue::new().with_auto_create(true);
        auto.enqueue_task("missing", task("k")).await.unwrap();
        assert_eq!(auto.enqueued("missing").await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_keys_are_dropped() {
        let queue = InMemoryQueue::new().with_auto_create(true);
        queue.enqueue_task("q", task("run-ocr-1")).await.unwrap();
        queue.enqueue_task("q", task("run-ocr-1")).await.unwrap();
        queue.enqueue_task("q", task("run-ocr-2")).await.unwrap();

        assert_eq!(queue.total_enqueued().await, 2);

        let taken = queue.take_enqueued("q").await;
        assert_eq!(taken.len(), 2);
        queue.enqueue_task("q", task("run-ocr-1")).await.unwrap();
        assert!(queue.enqueued("q").await.is_empty());
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let queue = InMemoryQueue::new();
        let limits = RateLimits::default();
        let retry = RetryPolicy::default();

        queue.create_queue("q", &limits, &retry).await.unwrap();
        let err = queue.create_queue("q", &limits, &retry).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExists { .. }));
        assert_eq!(queue.rate_limits("q").await, Some((limits, retry)));
    }
}
