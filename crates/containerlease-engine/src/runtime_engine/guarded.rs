// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wraps a [`RuntimeEngine`] with [`RetryPolicy`] and [`CircuitBreaker`]
//! (spec §4.2, §4.9): every public call on the inner engine is retried with
//! exponential backoff and gated by a shared breaker, so callers (the
//! provisioning driver, the reconciler) only ever see the plain trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use containerlease_core::{CircuitBreaker, RetryPolicy};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::traits::{
    CancelToken, ContainerMetrics, CreateOptions, LogStream, Result, RuntimeEngine,
    RuntimeEngineError,
};

/// A [`RuntimeEngine`] decorator that adds retry and circuit-breaking around
/// every call to the wrapped engine.
pub struct GuardedRuntimeEngine {
    inner: Arc<dyn RuntimeEngine>,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    attempt_timeout: Duration,
    shutdown: Arc<Notify>,
}

impl GuardedRuntimeEngine {
    /// Wrap `inner`, sharing `breaker` across every call this instance makes
    /// (the breaker is meant to be one-per-RuntimeEngine-instance, spec §5).
    pub fn new(
        inner: Arc<dyn RuntimeEngine>,
        retry: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
        attempt_timeout: Duration,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            inner,
            retry,
            breaker,
            attempt_timeout,
            shutdown,
        }
    }

    /// Current breaker state, exposed for readiness probes.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    async fn guarded_call<T, F, Fut>(&self, op: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.breaker.allow_request() {
            return Err(RuntimeEngineError::CircuitOpen(op.to_string()));
        }
        let timeout = self.attempt_timeout;
        let breaker = &self.breaker;
        self.retry
            .run(&self.shutdown, || async {
                let attempt = tokio::time::timeout(timeout, f()).await;
                match attempt {
                    Ok(Ok(value)) => {
                        breaker.record_success();
                        Ok(value)
                    }
                    Ok(Err(err)) => {
                        breaker.record_failure();
                        warn!(op = op, error = %err, "runtime engine call failed");
                        Err(err)
                    }
                    Err(_elapsed) => {
                        breaker.record_failure();
                        warn!(op = op, timeout_secs = timeout.as_secs(), "runtime engine call timed out");
                        Err(RuntimeEngineError::Timeout(timeout))
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl RuntimeEngine for GuardedRuntimeEngine {
    fn engine_type(&self) -> &'static str {
        self.inner.engine_type()
    }

    async fn create_and_start(&self, options: &CreateOptions, cancel: Option<CancelToken>) -> Result<String> {
        self.guarded_call("create_and_start", || self.inner.create_and_start(options, cancel.clone()))
            .await
    }

    async fn stop(&self, engine_id: &str) -> Result<()> {
        self.guarded_call("stop", || self.inner.stop(engine_id)).await
    }

    async fn remove(&self, engine_id: &str) -> Result<()> {
        self.guarded_call("remove", || self.inner.remove(engine_id)).await
    }

    async fn is_running(&self, engine_id: &str) -> Result<bool> {
        self.guarded_call("is_running", || self.inner.is_running(engine_id)).await
    }

    async fn metrics(&self, engine_id: &str) -> Result<ContainerMetrics> {
        self.guarded_call("metrics", || self.inner.metrics(engine_id)).await
    }

    async fn create_volume(&self, container_id: &str, size_mb: u32) -> Result<String> {
        self.guarded_call("create_volume", || self.inner.create_volume(container_id, size_mb))
            .await
    }

    async fn remove_volume(&self, volume_id: &str) -> Result<()> {
        self.guarded_call("remove_volume", || self.inner.remove_volume(volume_id)).await
    }

    async fn commit_to_image(&self, engine_id: &str, image_name: &str) -> Result<()> {
        self.guarded_call("commit_to_image", || self.inner.commit_to_image(engine_id, image_name))
            .await
    }

    async fn remove_image(&self, image_name: &str) -> Result<()> {
        self.guarded_call("remove_image", || self.inner.remove_image(image_name)).await
    }

    async fn start(&self, engine_id: &str) -> Result<()> {
        self.guarded_call("start", || self.inner.start(engine_id)).await
    }

    async fn stream_logs(&self, engine_id: &str, cancel: Option<CancelToken>) -> Result<LogStream> {
        // Long-lived by contract; a single attempt with the breaker check,
        // no retry loop (retrying a half-streamed log would duplicate lines).
        if !self.breaker.allow_request() {
            return Err(RuntimeEngineError::CircuitOpen("stream_logs".to_string()));
        }
        match self.inner.stream_logs(engine_id, cancel).await {
            Ok(stream) => {
                self.breaker.record_success();
                Ok(stream)
            }
            Err(err) => {
                self.breaker.record_failure();
                debug!(error = %err, "stream_logs failed");
                Err(err)
            }
        }
    }
}
