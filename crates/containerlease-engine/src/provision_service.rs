// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Synchronous admission plus the asynchronous provisioning driver (spec
//! §4.3, §4.4). Modeled on `handle_start_instance` in the teacher's
//! `handlers.rs`: validate, commit a record synchronously, then hand the
//! slow runtime work to a background task that decouples from the caller's
//! own cancellation scope.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use containerlease_core::{ContainerRecord, ContainerStatus, Error, Result};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::presets;
use crate::repo::{ContainerRepo, LeaseRepo};
use crate::runtime_engine::{CreateOptions, RuntimeEngine, RuntimeEngineError};

/// Inputs to [`ProvisionService::provision`] (spec §4.3).
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Owning tenant, from the authenticated caller.
    pub tenant_id: String,
    /// Image, must be on the configured allow-list.
    pub image_type: String,
    /// Requested lease length in minutes.
    pub duration_minutes: u32,
    /// Requested CPU share; `0` defers to the image's default.
    pub cpu_milli: u32,
    /// Requested memory; `0` defers to the image's default.
    pub memory_mb: u32,
    /// Whether to seed a demo log line once the container is running.
    /// Carried through for the out-of-CORE logs-stream handler; unused here.
    pub log_demo: bool,
    /// Requested attached volume size; `0` means no volume.
    pub volume_size_mb: u32,
}

/// Drives admission and asynchronous provisioning of `ContainerRecord`s.
pub struct ProvisionService {
    container_repo: Arc<ContainerRepo>,
    lease_repo: Arc<LeaseRepo>,
    runtime: Arc<dyn RuntimeEngine>,
    config: Config,
    /// Process-lifetime cancellation, NOT the caller's request scope (spec
    /// §4.4): dropped only on server shutdown.
    shutdown: Arc<Notify>,
}

impl ProvisionService {
    /// Construct a service over the given repositories and runtime engine.
    pub fn new(
        container_repo: Arc<ContainerRepo>,
        lease_repo: Arc<LeaseRepo>,
        runtime: Arc<dyn RuntimeEngine>,
        config: Config,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            container_repo,
            lease_repo,
            runtime,
            config,
            shutdown,
        }
    }

    fn validate_bounds(&self, request: &ProvisionRequest) -> Result<(u32, u32, u32)> {
        let config = &self.config;
        if request.duration_minutes < config.min_duration_minutes
            || request.duration_minutes > config.max_duration_minutes
        {
            return Err(Error::Validation(format!(
                "duration_minutes must be between {} and {}",
                config.min_duration_minutes, config.max_duration_minutes
            )));
        }
        let cpu_milli = if request.cpu_milli == 0 { 500 } else { request.cpu_milli };
        let memory_mb = if request.memory_mb == 0 { 512 } else { request.memory_mb };
        if cpu_milli > config.max_cpu_milli {
            return Err(Error::Validation(format!(
                "cpu_milli {cpu_milli} exceeds cap {}",
                config.max_cpu_milli
            )));
        }
        if memory_mb > config.max_memory_mb {
            return Err(Error::Validation(format!(
                "memory_mb {memory_mb} exceeds cap {}",
                config.max_memory_mb
            )));
        }
        if request.volume_size_mb > config.max_volume_size_mb {
            return Err(Error::Validation(format!(
                "volume_size_mb {} exceeds cap {}",
                request.volume_size_mb, config.max_volume_size_mb
            )));
        }
        Ok((cpu_milli, memory_mb, request.volume_size_mb))
    }

    /// Synchronous admission (spec §4.3): validate, commit `pending` record
    /// and lease, spawn the async driver, return immediately.
    pub async fn provision(&self, request: ProvisionRequest) -> Result<ContainerRecord> {
        if !presets::is_allowed_image(&request.image_type) {
            return Err(Error::Validation(format!(
                "image_type '{}' is not on the allow-list",
                request.image_type
            )));
        }
        let (cpu_milli, memory_mb, volume_size_mb) = self.validate_bounds(&request)?;
        self.admit(request, cpu_milli, memory_mb, volume_size_mb).await
    }

    /// Admission for a container whose image is a committed snapshot image
    /// rather than an allow-listed base image (spec §4.5 `restore`): same
    /// bounds checks, no allow-list check.
    pub async fn provision_from_image(&self, request: ProvisionRequest) -> Result<ContainerRecord> {
        let (cpu_milli, memory_mb, volume_size_mb) = self.validate_bounds(&request)?;
        self.admit(request, cpu_milli, memory_mb, volume_size_mb).await
    }

    async fn admit(
        &self,
        request: ProvisionRequest,
        cpu_milli: u32,
        memory_mb: u32,
        volume_size_mb: u32,
    ) -> Result<ContainerRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let expiry_at = now + chrono::Duration::minutes(i64::from(request.duration_minutes));

        let record = ContainerRecord {
            id: id.clone(),
            engine_id: String::new(),
            tenant_id: request.tenant_id.clone(),
            image_type: request.image_type.clone(),
            status: ContainerStatus::Pending,
            cpu_milli,
            memory_mb,
            created_at: now,
            expiry_at,
            cost: 0.0,
            error_message: String::new(),
            volume_id: String::new(),
            volume_size_mb,
            restart_count: 0,
            max_restarts: ContainerRecord::DEFAULT_MAX_RESTARTS,
            last_failure_time: None,
            failure_reason: String::new(),
        };

        if let Err(err) = self.container_repo.put(&record).await {
            error!(container_id = %id, error = %err, "failed to persist pending container record");
            return Err(Error::Infrastructure(err.to_string()));
        }

        if let Err(err) = self.lease_repo.create(&id, expiry_at, request.duration_minutes).await {
            warn!(container_id = %id, error = %err, "lease write failed after record commit, rolling back");
            if let Err(cleanup_err) = self.container_repo.delete(&id).await {
                error!(container_id = %id, error = %cleanup_err, "failed to roll back orphaned container record");
            }
            return Err(Error::Infrastructure(err.to_string()));
        }

        info!(
            container_id = %id,
            tenant_id = %request.tenant_id,
            image_type = %request.image_type,
            duration_minutes = request.duration_minutes,
            "container record admitted, pending"
        );

        self.spawn_driver(id.clone());

        Ok(record)
    }

    fn spawn_driver(&self, container_id: String) {
        let container_repo = self.container_repo.clone();
        let runtime = self.runtime.clone();
        let shutdown = self.shutdown.clone();
        let attempt_timeout = Duration::from_secs(30);
        tokio::spawn(async move {
            drive_provisioning(container_repo, runtime, shutdown, container_id, attempt_timeout).await;
        });
    }
}

/// The asynchronous provisioning driver (spec §4.4). Free function so it can
/// be spawned without borrowing `ProvisionService`.
async fn drive_provisioning(
    container_repo: Arc<ContainerRepo>,
    runtime: Arc<dyn RuntimeEngine>,
    shutdown: Arc<Notify>,
    container_id: String,
    attempt_timeout: Duration,
) {
    let record = match container_repo.get(&container_id).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            error!(container_id = %container_id, "provisioning driver found no record to drive");
            return;
        }
        Err(err) => {
            error!(container_id = %container_id, error = %err, "provisioning driver failed to read record");
            return;
        }
    };

    let mut volume_id: Option<String> = None;
    if record.volume_size_mb > 0 {
        match runtime.create_volume(&container_id, record.volume_size_mb).await {
            Ok(id) => volume_id = Some(id),
            Err(err) => {
                warn!(container_id = %container_id, error = %err, "volume creation failed");
                mark_error(&container_repo, &container_id, describe_runtime_error(&err)).await;
                return;
            }
        }
    }

    let options = CreateOptions {
        container_id: container_id.clone(),
        image_type: record.image_type.clone(),
        cpu_milli: record.cpu_milli,
        memory_mb: record.memory_mb,
        volume_id: volume_id.clone(),
        timeout: attempt_timeout,
    };

    let engine_id = match runtime.create_and_start(&options, None).await {
        Ok(id) => id,
        Err(err) => {
            warn!(container_id = %container_id, error = %err, "container creation failed");
            if let Some(vol) = &volume_id {
                if let Err(remove_err) = runtime.remove_volume(vol).await {
                    if !matches!(remove_err, RuntimeEngineError::NotFound(_)) {
                        warn!(container_id = %container_id, volume_id = %vol, error = %remove_err, "failed to remove volume after create failure");
                    }
                }
            }
            mark_error(&container_repo, &container_id, describe_runtime_error(&err)).await;
            return;
        }
    };

    // Re-read: ownership and status may have changed while the runtime call
    // was in flight (spec §4.4 step 3 — the user-cancel race).
    let mut current = match container_repo.get(&container_id).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            warn!(container_id = %container_id, "record vanished mid-provisioning, tearing down new container");
            teardown_abandoned(&runtime, &engine_id, volume_id.as_deref()).await;
            return;
        }
        Err(err) => {
            error!(container_id = %container_id, error = %err, "failed to re-read record before committing running state");
            teardown_abandoned(&runtime, &engine_id, volume_id.as_deref()).await;
            return;
        }
    };

    if current.status == ContainerStatus::Terminated {
        info!(container_id = %container_id, "record was terminated during provisioning, tearing down");
        teardown_abandoned(&runtime, &engine_id, volume_id.as_deref()).await;
        return;
    }

    current.engine_id = engine_id.clone();
    current.status = ContainerStatus::Running;
    if let Some(vol) = volume_id {
        current.volume_id = vol;
    }

    if let Err(err) = container_repo.put(&current).await {
        error!(container_id = %container_id, error = %err, "failed to persist running state");
    } else {
        info!(container_id = %container_id, engine_id = %engine_id, "container running");
    }

    let _ = &shutdown; // retained for symmetry with the other long-lived tasks; retry honors it internally.
}

async fn teardown_abandoned(runtime: &Arc<dyn RuntimeEngine>, engine_id: &str, volume_id: Option<&str>) {
    if let Err(err) = runtime.stop(engine_id).await {
        if !matches!(err, RuntimeEngineError::NotFound(_)) {
            warn!(engine_id = %engine_id, error = %err, "failed to stop abandoned container");
        }
    }
    if let Err(err) = runtime.remove(engine_id).await {
        if !matches!(err, RuntimeEngineError::NotFound(_)) {
            warn!(engine_id = %engine_id, error = %err, "failed to remove abandoned container");
        }
    }
    if let Some(vol) = volume_id {
        if let Err(err) = runtime.remove_volume(vol).await {
            if !matches!(err, RuntimeEngineError::NotFound(_)) {
                warn!(volume_id = %vol, error = %err, "failed to remove abandoned volume");
            }
        }
    }
}

async fn mark_error(container_repo: &Arc<ContainerRepo>, container_id: &str, reason: String) {
    let Ok(Some(mut record)) = container_repo.get(container_id).await else {
        error!(container_id = %container_id, "cannot mark error: record missing");
        return;
    };
    if record.status == ContainerStatus::Terminated {
        return;
    }
    record.status = ContainerStatus::Error;
    record.error_message = reason;
    if let Err(err) = container_repo.put(&record).await {
        error!(container_id = %container_id, error = %err, "failed to persist error state");
    }
}

fn describe_runtime_error(err: &RuntimeEngineError) -> String {
    match err {
        RuntimeEngineError::CircuitOpen(_) => "circuit open".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_engine::MockRuntimeEngine;
    use containerlease_core::InMemoryStore;
    use std::time::Duration as StdDuration;

    fn config() -> Config {
        Config {
            port: 8080,
            store_url: "memory://".to_string(),
            runtime_engine_addr: "mock".to_string(),
            cleanup_interval: StdDuration::from_secs(60),
            min_duration_minutes: 1,
            max_duration_minutes: 240,
            max_cpu_milli: 4000,
            max_memory_mb: 8192,
            max_volume_size_mb: 10240,
            archive_retention: StdDuration::from_secs(900),
            chaos_enabled: false,
            snapshots_enabled: true,
            allowed_origins: Vec::new(),
            signing_key: String::new(),
        }
    }

    fn service(runtime: Arc<dyn RuntimeEngine>) -> (ProvisionService, Arc<ContainerRepo>, Arc<LeaseRepo>) {
        let store = Arc::new(InMemoryStore::new());
        let container_repo = Arc::new(ContainerRepo::new(store.clone(), StdDuration::from_secs(900)));
        let lease_repo = Arc::new(LeaseRepo::new(store));
        let svc = ProvisionService::new(
            container_repo.clone(),
            lease_repo.clone(),
            runtime,
            config(),
            Arc::new(Notify::new()),
        );
        (svc, container_repo, lease_repo)
    }

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            tenant_id: "tenant-a".to_string(),
            image_type: "alpine".to_string(),
            duration_minutes: 10,
            cpu_milli: 500,
            memory_mb: 512,
            log_demo: false,
            volume_size_mb: 0,
        }
    }

    #[tokio::test]
    async fn rejects_unknown_image() {
        let (svc, _, _) = service(Arc::new(MockRuntimeEngine::new()));
        let mut req = request();
        req.image_type = "windows".to_string();
        let result = svc.provision(req).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn rejects_duration_below_minimum() {
        let (svc, _, _) = service(Arc::new(MockRuntimeEngine::new()));
        let mut req = request();
        req.duration_minutes = 0;
        assert!(matches!(svc.provision(req).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn accepts_duration_at_minimum() {
        let (svc, _, _) = service(Arc::new(MockRuntimeEngine::new()));
        let mut req = request();
        req.duration_minutes = 1;
        assert!(svc.provision(req).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_cpu_over_cap() {
        let (svc, _, _) = service(Arc::new(MockRuntimeEngine::new()));
        let mut req = request();
        req.cpu_milli = 5000;
        assert!(matches!(svc.provision(req).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn accepts_cpu_at_cap() {
        let (svc, _, _) = service(Arc::new(MockRuntimeEngine::new()));
        let mut req = request();
        req.cpu_milli = 4000;
        assert!(svc.provision(req).await.is_ok());
    }

    #[tokio::test]
    async fn provision_is_pending_then_driver_marks_running() {
        let engine = Arc::new(MockRuntimeEngine::new());
        let (svc, container_repo, lease_repo) = service(engine.clone());
        let record = svc.provision(request()).await.unwrap();
        assert_eq!(record.status, ContainerStatus::Pending);

        let mut observed_running = false;
        for _ in 0..50 {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            let current = container_repo.get(&record.id).await.unwrap().unwrap();
            if current.status == ContainerStatus::Running {
                observed_running = true;
                assert!(!current.engine_id.is_empty());
                break;
            }
        }
        assert!(observed_running, "driver never transitioned record to running");
        assert!(lease_repo.get(&record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn volume_request_creates_and_binds_volume() {
        let engine = Arc::new(MockRuntimeEngine::new());
        let (svc, container_repo, _lease_repo) = service(engine.clone());
        let mut req = request();
        req.volume_size_mb = 512;
        let record = svc.provision(req).await.unwrap();

        let mut bound = false;
        for _ in 0..50 {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            let current = container_repo.get(&record.id).await.unwrap().unwrap();
            if current.status == ContainerStatus::Running && !current.volume_id.is_empty() {
                bound = true;
                assert!(engine.has_volume(&current.volume_id));
                break;
            }
        }
        assert!(bound, "volume was never bound to the running record");
    }

    #[tokio::test]
    async fn driver_marks_error_when_creation_fails() {
        let engine = Arc::new(MockRuntimeEngine::new());
        engine.fail_next_creates(100);
        let (svc, container_repo, _lease_repo) = service(engine);
        let record = svc.provision(request()).await.unwrap();

        let mut observed_error = false;
        for _ in 0..50 {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            let current = container_repo.get(&record.id).await.unwrap().unwrap();
            if current.status == ContainerStatus::Error {
                observed_error = true;
                assert!(!current.error_message.is_empty());
                break;
            }
        }
        assert!(observed_error, "driver never transitioned record to error");
    }
}
