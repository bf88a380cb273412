// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Optional fault-injection worker that exercises the self-heal path (spec
//! §4.8). Same `Notify`-shutdown worker shape as [`crate::reconciler::Reconciler`]
//! and the teacher's `CleanupWorker`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use containerlease_core::ContainerStatus;
use rand::Rng;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::repo::ContainerRepo;
use crate::runtime_engine::RuntimeEngine;

/// Tunables for [`ChaosInjector`].
#[derive(Debug, Clone, Copy)]
pub struct ChaosInjectorConfig {
    /// How often the injector considers acting.
    pub interval: Duration,
    /// Probability in `[0, 1]` of acting on a given tick.
    pub probability: f64,
    /// Maximum number of running records force-removed per tick.
    pub max_targets: usize,
}

impl Default for ChaosInjectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            probability: 0.1,
            max_targets: 1,
        }
    }
}

/// Force-removes a bounded number of running containers on a probabilistic
/// schedule so the self-heal path in [`crate::reconciler::Reconciler`] gets
/// exercised. Gated by `config.chaos_enabled` at the call site in `main`.
pub struct ChaosInjector {
    container_repo: Arc<ContainerRepo>,
    runtime: Arc<dyn RuntimeEngine>,
    config: ChaosInjectorConfig,
    shutdown: Arc<Notify>,
}

impl ChaosInjector {
    /// Construct a chaos injector over the given repository and runtime
    /// engine.
    pub fn new(container_repo: Arc<ContainerRepo>, runtime: Arc<dyn RuntimeEngine>, config: ChaosInjectorConfig) -> Self {
        Self {
            container_repo,
            runtime,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// A handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the injection loop until shutdown is signalled.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            probability = self.config.probability,
            "chaos injector started"
        );
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("chaos injector received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.interval) => {
                    self.tick().await;
                }
            }
        }
        info!("chaos injector stopped");
    }

    /// Consider acting once. Exposed directly so tests can drive deterministic
    /// ticks without relying on the RNG's timing.
    pub async fn tick(&self) {
        if !rand::rng().random_bool(self.config.probability) {
            return;
        }

        let records = match self.container_repo.list_all().await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "chaos injector failed to list records, skipping tick");
                return;
            }
        };

        let mut targets: Vec<_> = records
            .into_iter()
            .filter(|r| r.status == ContainerStatus::Running && !r.engine_id.is_empty())
            .collect();
        if targets.is_empty() {
            return;
        }
        targets.truncate(self.config.max_targets.max(1));

        for mut record in targets {
            if let Err(err) = self.runtime.stop(&record.engine_id).await {
                warn!(container_id = %record.id, engine_id = %record.engine_id, error = %err, "chaos injector failed to force-stop container");
                continue;
            }

            record.status = ContainerStatus::Exited;
            record.last_failure_time = Some(Utc::now());
            record.failure_reason = "chaos".to_string();
            if let Err(err) = self.container_repo.put(&record).await {
                warn!(container_id = %record.id, error = %err, "chaos injector failed to persist exited status");
                continue;
            }

            info!(container_id = %record.id, "chaos injector force-removed running container");
        }
    }
}
