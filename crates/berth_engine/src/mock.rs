//! Mock container engine for testing.
//!
//! Captures every call and returns configurable responses, so lifecycle
//! behavior can be verified without a running engine. Exported un-gated so
//! downstream crates can drive their own tests with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio::sync::watch;
use uuid::Uuid;

use crate::engine::{ContainerEngine, ContainerRuntimeInfo, ContainerSpec, PullProgress};
use crate::error::{EngineError, EngineResult};

/// Mock engine with captured calls and scripted responses.
#[derive(Clone)]
pub struct MockEngine {
    /// Full image references that "exist" locally.
    images: Arc<RwLock<Vec<String>>>,
    /// Progress events returned by the next pull.
    pull_events: Arc<RwLock<Vec<PullProgress>>>,
    pull_count: Arc<AtomicUsize>,
    /// Method names, in call order.
    calls: Arc<RwLock<Vec<String>>>,
    /// Runtime info returned by inspect.
    runtime_info: Arc<RwLock<ContainerRuntimeInfo>>,
    /// Failure messages for individual operations.
    fail_create: Arc<RwLock<Option<String>>>,
    fail_kill: Arc<RwLock<Option<String>>>,
    fail_remove: Arc<RwLock<Option<String>>>,
    /// Exit status observed by wait_container once set.
    exit_tx: Arc<watch::Sender<Option<i64>>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            images: Arc::new(RwLock::new(Vec::new())),
            pull_events: Arc::new(RwLock::new(Vec::new())),
            pull_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(RwLock::new(Vec::new())),
            runtime_info: Arc::new(RwLock::new(ContainerRuntimeInfo {
                name: "berth-mock".to_string(),
                mapped_ports: HashMap::new(),
            })),
            fail_create: Arc::new(RwLock::new(None)),
            fail_kill: Arc::new(RwLock::new(None)),
            fail_remove: Arc::new(RwLock::new(None)),
            exit_tx: Arc::new(exit_tx),
        }
    }

    /// Add a full image reference that should "exist" locally.
    pub fn with_image(self, reference: impl Into<String>) -> Self {
        self.images.write().push(reference.into());
        self
    }

    /// Script the progress events returned by the next pull.
    pub fn with_pull_events(self, events: Vec<PullProgress>) -> Self {
        *self.pull_events.write() = events;
        self
    }

    /// Set the runtime info returned by inspect.
    pub fn with_runtime_info(self, name: impl Into<String>, ports: HashMap<u16, u16>) -> Self {
        *self.runtime_info.write() = ContainerRuntimeInfo {
            name: name.into(),
            mapped_ports: ports,
        };
        self
    }

    /// Make create_container fail with the given message.
    pub fn fail_create(self, message: impl Into<String>) -> Self {
        *self.fail_create.write() = Some(message.into());
        self
    }

    /// Make kill_container fail with the given message.
    pub fn fail_kill(self, message: impl Into<String>) -> Self {
        *self.fail_kill.write() = Some(message.into());
        self
    }

    /// Make remove_container fail with the given message.
    pub fn fail_remove(self, message: impl Into<String>) -> Self {
        *self.fail_remove.write() = Some(message.into());
        self
    }

    /// Unblock pending (and future) wait_container calls with an exit status.
    pub fn trigger_exit(&self, status_code: i64) {
        let _ = self.exit_tx.send_replace(Some(status_code));
    }

    /// Number of pulls issued.
    pub fn pull_count(&self) -> usize {
        self.pull_count.load(Ordering::SeqCst)
    }

    /// Number of calls to a specific method.
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.read().iter().filter(|m| *m == method).count()
    }

    /// All captured method names, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().clone()
    }

    fn record(&self, method: &str) {
        self.calls.write().push(method.to_string());
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn image_tags(&self, name: &str) -> EngineResult<Vec<String>> {
        self.record("image_tags");
        let prefix = format!("{}:", name);
        Ok(self
            .images
            .read()
            .iter()
            .filter(|r| r.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn pull_image(
        &self,
        name: &str,
        tag: &str,
    ) -> EngineResult<BoxStream<'static, EngineResult<PullProgress>>> {
        self.record("pull_image");
        let _ = self.pull_count.fetch_add(1, Ordering::SeqCst);

        let events = self.pull_events.read().clone();
        if events.iter().all(|e| e.error.is_none()) {
            self.images.write().push(format!("{}:{}", name, tag));
        }

        Ok(futures_util::stream::iter(events.into_iter().map(Ok)).boxed())
    }

    async fn create_container(&self, _name: &str, _spec: &ContainerSpec) -> EngineResult<String> {
        self.record("create_container");
        if let Some(msg) = self.fail_create.read().clone() {
            return Err(EngineError::Unavailable(msg));
        }
        Ok(format!("mock-{}", Uuid::new_v4()))
    }

    async fn start_container(&self, _id: &str) -> EngineResult<()> {
        self.record("start_container");
        Ok(())
    }

    async fn inspect_container(&self, _id: &str) -> EngineResult<ContainerRuntimeInfo> {
        self.record("inspect_container");
        Ok(self.runtime_info.read().clone())
    }

    async fn wait_container(&self, _id: &str) -> EngineResult<i64> {
        self.record("wait_container");
        let mut rx = self.exit_tx.subscribe();
        loop {
            if let Some(code) = *rx.borrow() {
                return Ok(code);
            }
            rx.changed()
                .await
                .map_err(|_| EngineError::WaitInterrupted)?;
        }
    }

    async fn kill_container(&self, _id: &str) -> EngineResult<()> {
        self.record("kill_container");
        if let Some(msg) = self.fail_kill.read().clone() {
            return Err(EngineError::Unavailable(msg));
        }
        Ok(())
    }

    async fn remove_container(&self, _id: &str, _force: bool) -> EngineResult<()> {
        self.record("remove_container");
        if let Some(msg) = self.fail_remove.read().clone() {
            return Err(EngineError::Unavailable(msg));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn image_tags_filters_by_name() {
        let engine = MockEngine::new()
            .with_image("nginx:latest")
            .with_image("nginx:1.25")
            .with_image("redis:7");

        let tags = engine.image_tags("nginx").await.unwrap();
        assert_eq!(tags, vec!["nginx:latest", "nginx:1.25"]);
    }

    #[tokio::test]
    async fn successful_pull_registers_image() {
        let engine = MockEngine::new();
        let mut stream = engine.pull_image("nginx", "latest").await.unwrap();
        while stream.next().await.is_some() {}

        assert_eq!(engine.pull_count(), 1);
        let tags = engine.image_tags("nginx").await.unwrap();
        assert_eq!(tags, vec!["nginx:latest"]);
    }

    #[tokio::test]
    async fn trigger_exit_wakes_pending_wait() {
        let engine = MockEngine::new();
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.wait_container("mock-id").await })
        };

        // Give the waiter a chance to block first.
        tokio::task::yield_now().await;
        engine.trigger_exit(137);

        let status = waiter.await.unwrap().unwrap();
        assert_eq!(status, 137);
    }

    #[tokio::test]
    async fn kill_failure_is_injectable() {
        let engine = MockEngine::new().fail_kill("already gone");
        let err = engine.kill_container("mock-id").await.unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }
}
