// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Abstraction over the single-node container runtime (spec §4.2).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors a [`RuntimeEngine`] implementation can return.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RuntimeEngineError {
    /// No runtime container or volume exists for the given handle.
    #[error("not found: {0}")]
    NotFound(String),
    /// The create-and-start call failed before a handle was assigned.
    #[error("start failed: {0}")]
    StartFailed(String),
    /// The call exceeded its per-attempt timeout.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// The call was cancelled via its cancellation token.
    #[error("cancelled")]
    Cancelled,
    /// The breaker in front of this engine is open; refused without attempting the call.
    #[error("circuit open: {0}")]
    CircuitOpen(String),
    /// Any other backend failure.
    #[error("runtime engine error: {0}")]
    Other(String),
}

/// Result alias over [`RuntimeEngineError`].
pub type Result<T> = std::result::Result<T, RuntimeEngineError>;

/// Cooperative cancellation flag threaded through every `RuntimeEngine` call.
pub type CancelToken = std::sync::Arc<std::sync::atomic::AtomicBool>;

/// Parameters for creating and starting a runtime container.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Domain id of the owning `ContainerRecord`, used to derive a
    /// deterministic volume id and for log correlation.
    pub container_id: String,
    /// Image to run, already resolved from the allow-list.
    pub image_type: String,
    /// Requested CPU share in milli-cores.
    pub cpu_milli: u32,
    /// Requested memory in megabytes.
    pub memory_mb: u32,
    /// Volume to bind-mount, if any.
    pub volume_id: Option<String>,
    /// Per-attempt timeout for the create call.
    pub timeout: std::time::Duration,
}

/// Live resource usage of a runtime container, sampled best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerMetrics {
    /// Peak memory usage in bytes, if the runtime reports it.
    pub memory_peak_bytes: Option<u64>,
    /// Current memory usage in bytes, if the runtime reports it.
    pub memory_current_bytes: Option<u64>,
    /// Cumulative CPU time in microseconds, if the runtime reports it.
    pub cpu_usage_usec: Option<u64>,
}

/// A chunk of container log output.
#[derive(Debug, Clone)]
pub enum LogChunk {
    /// Raw bytes read from the container's combined stdout/stderr.
    Data(Vec<u8>),
}

/// A possibly long-lived producer of [`LogChunk`]s. The caller (the
/// out-of-CORE log-stream handler) is responsible for closing it by
/// dropping the stream, which callers do by cancelling the associated
/// `CancelToken`.
pub type LogStream = std::pin::Pin<Box<dyn futures::Stream<Item = Result<LogChunk>> + Send>>;

/// Adapter over a single-node container runtime. Every method is wrapped by
/// [`containerlease_core::RetryPolicy`] and gated by
/// [`containerlease_core::CircuitBreaker`] at the call site
/// (see [`crate::runtime_engine::guarded::GuardedRuntimeEngine`]); the trait
/// itself stays a thin, direct mapping onto the underlying runtime API so
/// that a test double can implement it trivially.
#[async_trait]
pub trait RuntimeEngine: Send + Sync {
    /// Human-readable identifier for the backing runtime, for logging.
    fn engine_type(&self) -> &'static str;

    /// Create and start a container, returning its runtime-assigned handle.
    /// Not idempotent: calling twice creates two containers.
    async fn create_and_start(&self, options: &CreateOptions, cancel: Option<CancelToken>) -> Result<String>;

    /// Stop a running container with a bounded grace period. A "not found"
    /// error is treated by callers as success (idempotent terminal).
    async fn stop(&self, engine_id: &str) -> Result<()>;

    /// Force-remove a container. Same not-found-is-success contract as [`stop`](Self::stop).
    async fn remove(&self, engine_id: &str) -> Result<()>;

    /// Whether the container is currently running.
    async fn is_running(&self, engine_id: &str) -> Result<bool>;

    /// Sample current resource usage, best-effort.
    async fn metrics(&self, engine_id: &str) -> Result<ContainerMetrics>;

    /// Create a named volume of the given size, returning its id.
    async fn create_volume(&self, container_id: &str, size_mb: u32) -> Result<String>;

    /// Remove a volume. Same not-found-is-success contract as [`stop`](Self::stop).
    async fn remove_volume(&self, volume_id: &str) -> Result<()>;

    /// Commit the container's current filesystem to a new image, returning
    /// the image name.
    async fn commit_to_image(&self, engine_id: &str, image_name: &str) -> Result<()>;

    /// Remove a previously committed image. Non-fatal on failure for
    /// callers: the image may already be garbage-collected.
    async fn remove_image(&self, image_name: &str) -> Result<()>;

    /// Start (or restart) an existing, stopped container handle. Used by the
    /// self-heal path; default implementation reports it unsupported.
    async fn start(&self, _engine_id: &str) -> Result<()> {
        Err(RuntimeEngineError::Other("start not supported".to_string()))
    }

    /// Follow the container's combined stdout/stderr. May be long-lived; the
    /// caller closes it by cancelling `cancel`.
    async fn stream_logs(&self, engine_id: &str, cancel: Option<CancelToken>) -> Result<LogStream>;
}
