// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process `RuntimeEngine` test double, modeled on the teacher's
//! `MockRunner` (`runner/mock.rs`): no real container ever exists, but the
//! observable state transitions (running, stopped, removed) match what a
//! real backend would produce, so tests can assert against it directly.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::stream;

use super::traits::{
    CancelToken, ContainerMetrics, CreateOptions, LogChunk, LogStream, Result, RuntimeEngine,
    RuntimeEngineError,
};

#[derive(Default)]
struct State {
    running: HashSet<String>,
    volumes: HashSet<String>,
    images: HashSet<String>,
    stopped: HashSet<String>,
}

/// A `RuntimeEngine` double that tracks live container/volume/image handles
/// in memory. Supports scripted failures so tests can exercise the retry
/// and circuit-breaker paths deterministically.
pub struct MockRuntimeEngine {
    state: Mutex<State>,
    next_id: AtomicU64,
    /// When `Some(n)`, the next `n` calls to `create_and_start` fail before
    /// succeeding; used to drive the circuit breaker open in tests.
    fail_create_times: Mutex<u32>,
}

impl Default for MockRuntimeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntimeEngine {
    /// Construct an empty engine double.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_id: AtomicU64::new(1),
            fail_create_times: Mutex::new(0),
        }
    }

    /// Make the next `n` calls to `create_and_start` fail.
    pub fn fail_next_creates(&self, n: u32) {
        *self.fail_create_times.lock().unwrap_or_else(|e| e.into_inner()) = n;
    }

    /// Whether `engine_id` is currently tracked as running.
    pub fn is_tracked_running(&self, engine_id: &str) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).running.contains(engine_id)
    }

    /// Whether `volume_id` still exists.
    pub fn has_volume(&self, volume_id: &str) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).volumes.contains(volume_id)
    }

    /// Whether `image_name` still exists.
    pub fn has_image(&self, image_name: &str) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).images.contains(image_name)
    }

    /// Force-remove a running container out-of-band, as the chaos injector
    /// does, without going through the normal `stop`/`remove` path.
    pub fn chaos_kill(&self, engine_id: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.running.remove(engine_id) {
            state.stopped.insert(engine_id.to_string());
            true
        } else {
            false
        }
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}")
    }
}

#[async_trait]
impl RuntimeEngine for MockRuntimeEngine {
    fn engine_type(&self) -> &'static str {
        "mock"
    }

    async fn create_and_start(&self, options: &CreateOptions, cancel: Option<CancelToken>) -> Result<String> {
        if let Some(token) = &cancel {
            if token.load(Ordering::SeqCst) {
                return Err(RuntimeEngineError::Cancelled);
            }
        }
        {
            let mut remaining = self.fail_create_times.lock().unwrap_or_else(|e| e.into_inner());
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RuntimeEngineError::StartFailed(format!(
                    "mock: scripted failure for {}",
                    options.container_id
                )));
            }
        }
        let engine_id = self.fresh_id("engine");
        self.state.lock().unwrap_or_else(|e| e.into_inner()).running.insert(engine_id.clone());
        Ok(engine_id)
    }

    async fn stop(&self, engine_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.running.remove(engine_id) && !state.stopped.contains(engine_id) {
            return Err(RuntimeEngineError::NotFound(engine_id.to_string()));
        }
        state.stopped.insert(engine_id.to_string());
        Ok(())
    }

    async fn remove(&self, engine_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let was_known = state.running.remove(engine_id) || state.stopped.remove(engine_id);
        if !was_known {
            return Err(RuntimeEngineError::NotFound(engine_id.to_string()));
        }
        Ok(())
    }

    async fn is_running(&self, engine_id: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).running.contains(engine_id))
    }

    async fn metrics(&self, _engine_id: &str) -> Result<ContainerMetrics> {
        Ok(ContainerMetrics {
            memory_peak_bytes: Some(0),
            memory_current_bytes: Some(0),
            cpu_usage_usec: Some(0),
        })
    }

    async fn create_volume(&self, container_id: &str, _size_mb: u32) -> Result<String> {
        let volume_id = format!("vol-{container_id}");
        self.state.lock().unwrap_or_else(|e| e.into_inner()).volumes.insert(volume_id.clone());
        Ok(volume_id)
    }

    async fn remove_volume(&self, volume_id: &str) -> Result<()> {
        let removed = self.state.lock().unwrap_or_else(|e| e.into_inner()).volumes.remove(volume_id);
        if !removed {
            return Err(RuntimeEngineError::NotFound(volume_id.to_string()));
        }
        Ok(())
    }

    async fn commit_to_image(&self, engine_id: &str, image_name: &str) -> Result<()> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.running.contains(engine_id) {
            return Err(RuntimeEngineError::NotFound(engine_id.to_string()));
        }
        drop(state);
        self.state.lock().unwrap_or_else(|e| e.into_inner()).images.insert(image_name.to_string());
        Ok(())
    }

    async fn remove_image(&self, image_name: &str) -> Result<()> {
        let removed = self.state.lock().unwrap_or_else(|e| e.into_inner()).images.remove(image_name);
        if !removed {
            return Err(RuntimeEngineError::NotFound(image_name.to_string()));
        }
        Ok(())
    }

    async fn start(&self, engine_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.stopped.remove(engine_id) {
            return Err(RuntimeEngineError::NotFound(engine_id.to_string()));
        }
        state.running.insert(engine_id.to_string());
        Ok(())
    }

    async fn stream_logs(&self, engine_id: &str, _cancel: Option<CancelToken>) -> Result<LogStream> {
        if !self.is_tracked_running(engine_id) {
            return Err(RuntimeEngineError::NotFound(engine_id.to_string()));
        }
        let line = format!("mock log line for {engine_id}\n").into_bytes();
        Ok(Box::pin(stream::once(async move { Ok(LogChunk::Data(line)) })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn options(id: &str) -> CreateOptions {
        CreateOptions {
            container_id: id.to_string(),
            image_type: "alpine".to_string(),
            cpu_milli: 500,
            memory_mb: 512,
            volume_id: None,
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn create_then_stop_then_remove() {
        let engine = MockRuntimeEngine::new();
        let id = engine.create_and_start(&options("c1"), None).await.unwrap();
        assert!(engine.is_running(&id).await.unwrap());
        engine.stop(&id).await.unwrap();
        assert!(!engine.is_running(&id).await.unwrap());
        engine.remove(&id).await.unwrap();
        assert!(matches!(engine.remove(&id).await, Err(RuntimeEngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn stop_is_idempotent_after_stop() {
        let engine = MockRuntimeEngine::new();
        let id = engine.create_and_start(&options("c1"), None).await.unwrap();
        engine.stop(&id).await.unwrap();
        engine.stop(&id).await.unwrap();
    }

    #[tokio::test]
    async fn scripted_failures_exhaust() {
        let engine = MockRuntimeEngine::new();
        engine.fail_next_creates(2);
        assert!(engine.create_and_start(&options("c1"), None).await.is_err());
        assert!(engine.create_and_start(&options("c1"), None).await.is_err());
        assert!(engine.create_and_start(&options("c1"), None).await.is_ok());
    }

    #[tokio::test]
    async fn cancellation_is_observed() {
        let engine = MockRuntimeEngine::new();
        let cancel: CancelToken = Arc::new(AtomicBool::new(true));
        let result = engine.create_and_start(&options("c1"), Some(cancel)).await;
        assert!(matches!(result, Err(RuntimeEngineError::Cancelled)));
    }

    #[tokio::test]
    async fn volume_lifecycle() {
        let engine = MockRuntimeEngine::new();
        let volume_id = engine.create_volume("c1", 512).await.unwrap();
        assert!(engine.has_volume(&volume_id));
        engine.remove_volume(&volume_id).await.unwrap();
        assert!(!engine.has_volume(&volume_id));
    }

    #[tokio::test]
    async fn commit_then_remove_image() {
        let engine = MockRuntimeEngine::new();
        let id = engine.create_and_start(&options("c1"), None).await.unwrap();
        engine.commit_to_image(&id, "c1-snap").await.unwrap();
        assert!(engine.has_image("c1-snap"));
        engine.remove_image("c1-snap").await.unwrap();
        assert!(!engine.has_image("c1-snap"));
    }

    #[tokio::test]
    async fn chaos_kill_moves_container_to_stopped() {
        let engine = MockRuntimeEngine::new();
        let id = engine.create_and_start(&options("c1"), None).await.unwrap();
        assert!(engine.chaos_kill(&id));
        assert!(!engine.is_running(&id).await.unwrap());
        engine.start(&id).await.unwrap();
        assert!(engine.is_running(&id).await.unwrap());
    }
}
