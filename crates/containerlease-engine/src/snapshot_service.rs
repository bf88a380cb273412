// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Commit-to-image lifecycle, layered over [`SnapshotRepo`] and
//! [`RuntimeEngine`] (spec §4.5).

use std::sync::Arc;

use chrono::Utc;
use containerlease_core::{ContainerStatus, Error, Result, SnapshotRecord};
use tracing::{info, warn};

use crate::provision_service::{ProvisionRequest, ProvisionService};
use crate::repo::{ContainerRepo, SnapshotRepo};
use crate::runtime_engine::RuntimeEngine;

/// Options accepted by [`SnapshotService::restore`].
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Lease length for the freshly provisioned container.
    pub duration_minutes: u32,
    /// CPU share; `0` defers to the default.
    pub cpu_milli: u32,
    /// Memory; `0` defers to the default.
    pub memory_mb: u32,
}

/// Owns commit-to-image and image deletion, enforcing per-record ownership.
pub struct SnapshotService {
    container_repo: Arc<ContainerRepo>,
    snapshot_repo: Arc<SnapshotRepo>,
    runtime: Arc<dyn RuntimeEngine>,
}

impl SnapshotService {
    /// Construct a service over the given repositories and runtime engine.
    pub fn new(
        container_repo: Arc<ContainerRepo>,
        snapshot_repo: Arc<SnapshotRepo>,
        runtime: Arc<dyn RuntimeEngine>,
    ) -> Self {
        Self {
            container_repo,
            snapshot_repo,
            runtime,
        }
    }

    /// Commit `container_id`'s filesystem to a new image and record it.
    /// Requires the container to be `running` with a non-empty `engine_id`.
    pub async fn create(
        &self,
        container_id: &str,
        tenant_id: &str,
        is_admin: bool,
        description: String,
    ) -> Result<SnapshotRecord> {
        let container = self.container_repo.get_owned(container_id, tenant_id, is_admin).await?;

        if container.status != ContainerStatus::Running || container.engine_id.is_empty() {
            return Err(Error::Conflict(format!(
                "container {container_id} is not running; snapshot requires a running container"
            )));
        }

        let snapshot_id = uuid::Uuid::new_v4().to_string();
        let image_name = format!("{container_id}-snap-{}", Utc::now().timestamp_millis());

        self.runtime
            .commit_to_image(&container.engine_id, &image_name)
            .await
            .map_err(|err| Error::Infrastructure(err.to_string()))?;

        let record = SnapshotRecord {
            id: snapshot_id.clone(),
            container_id: container.id.clone(),
            tenant_id: container.tenant_id.clone(),
            image_name: image_name.clone(),
            created_at: Utc::now(),
            size_bytes: 0,
            description,
        };

        if let Err(err) = self.snapshot_repo.put(&record).await {
            warn!(
                snapshot_id = %snapshot_id,
                container_id = %container_id,
                error = %err,
                "snapshot metadata write failed after successful commit, compensating"
            );
            if let Err(remove_err) = self.runtime.remove_image(&image_name).await {
                warn!(image_name = %image_name, error = %remove_err, "failed to remove orphaned snapshot image");
            }
            return Err(Error::Infrastructure(err.to_string()));
        }

        info!(snapshot_id = %snapshot_id, container_id = %container_id, image_name = %image_name, "snapshot created");
        Ok(record)
    }

    /// Delete a snapshot: best-effort image removal, then the record and both
    /// index-set memberships.
    pub async fn delete(&self, snapshot_id: &str, tenant_id: &str, is_admin: bool) -> Result<()> {
        let record = self.snapshot_repo.get_owned(snapshot_id, tenant_id, is_admin).await?;

        if let Err(err) = self.runtime.remove_image(&record.image_name).await {
            warn!(snapshot_id = %snapshot_id, image_name = %record.image_name, error = %err, "failed to remove snapshot image, continuing");
        }

        self.snapshot_repo.delete(&record).await?;
        info!(snapshot_id = %snapshot_id, container_id = %record.container_id, "snapshot deleted");
        Ok(())
    }

    /// List snapshots committed from `container_id`, enforcing ownership on
    /// the source container.
    pub async fn list_by_container(&self, container_id: &str, tenant_id: &str, is_admin: bool) -> Result<Vec<String>> {
        self.container_repo.get_owned(container_id, tenant_id, is_admin).await?;
        self.snapshot_repo.list_by_container(container_id).await
    }

    /// List snapshots owned by `tenant_id`.
    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<String>> {
        self.snapshot_repo.list_by_tenant(tenant_id).await
    }

    /// Restore a snapshot by provisioning a fresh container from its image
    /// (spec §4.5, §9 Open Question: resolved as new id, new lease).
    pub async fn restore(
        &self,
        snapshot_id: &str,
        tenant_id: &str,
        is_admin: bool,
        options: RestoreOptions,
        provision_service: &ProvisionService,
    ) -> Result<containerlease_core::ContainerRecord> {
        let snapshot = self.snapshot_repo.get_owned(snapshot_id, tenant_id, is_admin).await?;

        let request = ProvisionRequest {
            tenant_id: snapshot.tenant_id.clone(),
            image_type: snapshot.image_name.clone(),
            duration_minutes: options.duration_minutes,
            cpu_milli: options.cpu_milli,
            memory_mb: options.memory_mb,
            log_demo: false,
            volume_size_mb: 0,
        };
        provision_service.provision_from_image(request).await
    }
}
