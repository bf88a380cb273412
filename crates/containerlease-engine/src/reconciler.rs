// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Periodic sweeper that drives expired or orphaned records to `terminated`
//! (spec §4.6). Structured as a long-lived worker with a `Notify` shutdown
//! handle, the same shape as the teacher's `CleanupWorker`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use containerlease_core::{
    calculate_cost, ContainerRecord, ContainerStatus, Error, Result, RetryPolicy,
};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::repo::{ContainerRepo, LeaseRepo};
use crate::runtime_engine::{RuntimeEngine, RuntimeEngineError};

/// Tunables for [`Reconciler`].
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerConfig {
    /// How often the sweep runs.
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Counters observed after a completed sweep (spec §9 active-running gauge).
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcilerStats {
    /// Number of records with `status = running` as of the last tick.
    pub active_running: i64,
    /// Total records cleaned up across the worker's lifetime.
    pub total_cleaned: u64,
}

/// Periodic sweeper owning the expiry/orphan/self-heal decision for every
/// `ContainerRecord`.
pub struct Reconciler {
    container_repo: Arc<ContainerRepo>,
    lease_repo: Arc<LeaseRepo>,
    runtime: Arc<dyn RuntimeEngine>,
    config: ReconcilerConfig,
    retry: RetryPolicy,
    shutdown: Arc<Notify>,
    active_running: AtomicI64,
    total_cleaned: AtomicU64,
}

impl Reconciler {
    /// Construct a reconciler over the given repositories and runtime engine.
    pub fn new(
        container_repo: Arc<ContainerRepo>,
        lease_repo: Arc<LeaseRepo>,
        runtime: Arc<dyn RuntimeEngine>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            container_repo,
            lease_repo,
            runtime,
            config,
            retry: RetryPolicy::reconciler(),
            shutdown: Arc::new(Notify::new()),
            active_running: AtomicI64::new(0),
            total_cleaned: AtomicU64::new(0),
        }
    }

    /// A handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Current observable counters.
    pub fn stats(&self) -> ReconcilerStats {
        ReconcilerStats {
            active_running: self.active_running.load(Ordering::SeqCst),
            total_cleaned: self.total_cleaned.load(Ordering::SeqCst),
        }
    }

    /// Number of records currently `running`, as of the last completed tick.
    pub fn active_running(&self) -> i64 {
        self.active_running.load(Ordering::SeqCst)
    }

    /// Run the sweep loop until shutdown is signalled.
    pub async fn run(&self) {
        info!(interval_secs = self.config.interval.as_secs(), "reconciler started");
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("reconciler received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.interval) => {
                    self.tick().await;
                }
            }
        }
        info!("reconciler stopped");
    }

    /// Run one sweep over every record. Exposed directly so tests can drive
    /// deterministic ticks without waiting on the timer.
    pub async fn tick(&self) {
        let now = Utc::now();
        let records = match self.container_repo.list_all().await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "reconciler failed to list records, skipping tick");
                return;
            }
        };

        let running_count = records.iter().filter(|r| r.status == ContainerStatus::Running).count();
        self.active_running.store(running_count as i64, Ordering::SeqCst);

        for record in records {
            if record.status == ContainerStatus::Terminated {
                continue;
            }

            if record.is_expired(now) {
                self.cleanup_with_retries(&record.id).await;
                continue;
            }

            if record.status == ContainerStatus::Exited {
                self.handle_exited(&record, now).await;
                continue;
            }

            match self.lease_repo.get(&record.id).await {
                Ok(None) => {
                    warn!(container_id = %record.id, "orphaned record: lease missing, cleaning up");
                    self.cleanup_with_retries(&record.id).await;
                }
                Ok(Some(_)) => {}
                Err(err) => {
                    error!(container_id = %record.id, error = %err, "failed to check lease, leaving record for next tick");
                }
            }
        }
    }

    /// Self-heal branch (spec §4.8, §9 Open Question: implemented): an
    /// `exited` record with restart budget left and a still-valid lease is
    /// restarted; otherwise it is folded into cleanup.
    async fn handle_exited(&self, record: &ContainerRecord, now: chrono::DateTime<Utc>) {
        if !record.is_restart_eligible(now) {
            self.cleanup_with_retries(&record.id).await;
            return;
        }

        match self.runtime.start(&record.engine_id).await {
            Ok(()) => {
                let mut current = match self.container_repo.get(&record.id).await {
                    Ok(Some(r)) => r,
                    _ => return,
                };
                if current.status != ContainerStatus::Exited {
                    return;
                }
                current.restart_count += 1;
                current.status = ContainerStatus::Running;
                if let Err(err) = self.container_repo.put(&current).await {
                    error!(container_id = %record.id, error = %err, "failed to persist restarted record");
                } else {
                    info!(container_id = %record.id, restart_count = current.restart_count, "self-heal restart succeeded");
                }
            }
            Err(err) => {
                warn!(container_id = %record.id, error = %err, "self-heal restart failed, will retry next tick");
            }
        }
    }

    /// Drive one record to `terminated`, retrying per spec §4.6 with
    /// `attempt^2 s` backoff. Failures are logged and left for the next tick.
    async fn cleanup_with_retries(&self, container_id: &str) {
        let container_id = container_id.to_string();
        let result = self
            .retry
            .run(&self.shutdown, || self.cleanup(&container_id))
            .await;
        match result {
            Ok(()) => {
                self.total_cleaned.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
                error!(container_id = %container_id, error = %err, "cleanup exhausted retries, will re-attempt next tick");
            }
        }
    }

    /// One cleanup attempt (spec §4.6 `cleanup(c)`). Idempotent: re-reads the
    /// record so concurrent terminal writers never clobber each other.
    async fn cleanup(&self, container_id: &str) -> Result<()> {
        let mut record = match self.container_repo.get(container_id).await? {
            Some(r) => r,
            None => return Ok(()),
        };
        if record.status == ContainerStatus::Terminated {
            return Ok(());
        }

        let was_running = record.status == ContainerStatus::Running;
        let runtime_minutes = (Utc::now() - record.created_at).num_seconds() as f64 / 60.0;

        if record.engine_id.is_empty() {
            record.cost = calculate_cost(&record.image_type, runtime_minutes);
        } else {
            self.stop_and_remove(&record.engine_id).await?;
            if !record.volume_id.is_empty() {
                self.remove_volume(&record.volume_id).await?;
            }
            record.cost = calculate_cost(&record.image_type, runtime_minutes);
        }

        record.status = ContainerStatus::Terminated;
        self.container_repo.put(&record).await?;
        self.lease_repo.delete(container_id).await?;

        if was_running {
            self.active_running.fetch_sub(1, Ordering::SeqCst);
        }

        info!(container_id = %container_id, cost = record.cost, "record terminated");
        Ok(())
    }

    async fn stop_and_remove(&self, engine_id: &str) -> Result<()> {
        match self.runtime.stop(engine_id).await {
            Ok(()) | Err(RuntimeEngineError::NotFound(_)) => {}
            Err(err) => return Err(Error::Infrastructure(err.to_string())),
        }
        match self.runtime.remove(engine_id).await {
            Ok(()) | Err(RuntimeEngineError::NotFound(_)) => Ok(()),
            Err(err) => Err(Error::Infrastructure(err.to_string())),
        }
    }

    async fn remove_volume(&self, volume_id: &str) -> Result<()> {
        match self.runtime.remove_volume(volume_id).await {
            Ok(()) | Err(RuntimeEngineError::NotFound(_)) => Ok(()),
            Err(err) => Err(Error::Infrastructure(err.to_string())),
        }
    }

    /// Explicit delete path (spec §4.7): identical to `cleanup` but without
    /// the reconciler's own retry wrapper — the caller observes the outcome
    /// directly, with ownership already checked by the caller.
    pub async fn delete_now(&self, container_id: &str) -> Result<()> {
        self.cleanup(container_id).await
    }
}
