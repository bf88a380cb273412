// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed `SnapshotRecord` access over the TTL store, maintaining the
//! `container_snapshots:*` and `tenant_snapshots:*` index sets.

use std::sync::Arc;
use std::time::Duration;

use containerlease_core::store::keys;
use containerlease_core::{Error, Result, SnapshotRecord, Store};

/// 30 days, per spec §6's persisted-state layout.
const SNAPSHOT_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Reads, writes, and indexes [`SnapshotRecord`]s.
pub struct SnapshotRepo {
    store: Arc<dyn Store>,
}

impl SnapshotRepo {
    /// Construct a repo over `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Persist `record` and add it to both index sets.
    pub async fn put(&self, record: &SnapshotRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.store
            .put(&keys::snapshot(&record.id), &bytes, SNAPSHOT_TTL)
            .await?;
        self.store
            .sadd(&keys::container_snapshots(&record.container_id), &record.id)
            .await?;
        self.store
            .sadd(&keys::tenant_snapshots(&record.tenant_id), &record.id)
            .await?;
        Ok(())
    }

    /// Fetch a snapshot by id.
    pub async fn get(&self, id: &str) -> Result<Option<SnapshotRecord>> {
        match self.store.get(&keys::snapshot(id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch a snapshot, enforcing tenant ownership (spec §3 invariant 7).
    pub async fn get_owned(&self, id: &str, tenant_id: &str, is_admin: bool) -> Result<SnapshotRecord> {
        let record = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("snapshot {id}")))?;
        if !is_admin && record.tenant_id != tenant_id {
            return Err(Error::Forbidden(format!(
                "tenant {tenant_id} does not own snapshot {id}"
            )));
        }
        Ok(record)
    }

    /// Remove a snapshot and both index-set memberships.
    pub async fn delete(&self, record: &SnapshotRecord) -> Result<()> {
        self.store.delete(&keys::snapshot(&record.id)).await?;
        self.store
            .srem(&keys::container_snapshots(&record.container_id), &record.id)
            .await?;
        self.store
            .srem(&keys::tenant_snapshots(&record.tenant_id), &record.id)
            .await?;
        Ok(())
    }

    /// List the snapshot ids committed from `container_id`.
    pub async fn list_by_container(&self, container_id: &str) -> Result<Vec<String>> {
        Ok(self.store.smembers(&keys::container_snapshots(container_id)).await?)
    }

    /// List the snapshot ids owned by `tenant_id`.
    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<String>> {
        Ok(self.store.smembers(&keys::tenant_snapshots(tenant_id)).await?)
    }
}
