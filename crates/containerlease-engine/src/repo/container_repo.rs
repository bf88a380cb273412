// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed `ContainerRecord` access over the TTL store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use containerlease_core::store::keys;
use containerlease_core::{ContainerRecord, ContainerStatus, Error, Result, Store};

/// Reads and writes [`ContainerRecord`]s, computing the TTL every write
/// needs to satisfy spec invariant 5 (active records outlive their lease;
/// terminated records survive for the archive retention window).
pub struct ContainerRepo {
    store: Arc<dyn Store>,
    archive_retention: Duration,
}

impl ContainerRepo {
    /// Construct a repo over `store`, using `archive_retention` for
    /// terminated records.
    pub fn new(store: Arc<dyn Store>, archive_retention: Duration) -> Self {
        Self {
            store,
            archive_retention,
        }
    }

    fn ttl_for(&self, record: &ContainerRecord) -> Duration {
        if record.status == ContainerStatus::Terminated {
            return self.archive_retention;
        }
        // Active records must stay observable past their own expiry so the
        // reconciler can still see and terminate them (spec §4.3 step 2: TTL
        // = duration + archive_retention, not bare time-until-expiry).
        let remaining = (record.expiry_at - Utc::now()).num_seconds();
        Duration::from_secs(remaining.max(0) as u64) + self.archive_retention
    }

    /// Persist `record`, computing TTL from its current status and expiry.
    pub async fn put(&self, record: &ContainerRecord) -> Result<()> {
        let ttl = self.ttl_for(record);
        let bytes = serde_json::to_vec(record)?;
        self.store
            .put(&keys::container(&record.id), &bytes, ttl)
            .await?;
        Ok(())
    }

    /// Fetch a record by id.
    pub async fn get(&self, id: &str) -> Result<Option<ContainerRecord>> {
        match self.store.get(&keys::container(id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch a record by id, requiring it to exist and be owned by `tenant_id`
    /// unless `is_admin` is set (spec §3 invariant 7).
    pub async fn get_owned(&self, id: &str, tenant_id: &str, is_admin: bool) -> Result<ContainerRecord> {
        let record = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("container {id}")))?;
        if !is_admin && record.tenant_id != tenant_id {
            return Err(Error::Forbidden(format!(
                "tenant {tenant_id} does not own container {id}"
            )));
        }
        Ok(record)
    }

    /// Remove a record outright (used once the reconciler has finished
    /// settling it, or to correct a partially-committed admission).
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(&keys::container(id)).await?;
        Ok(())
    }

    /// List every `ContainerRecord` currently in the store. Eventually
    /// consistent: duplicates or transient misses are tolerated by callers
    /// (the reconciler).
    pub async fn list_all(&self) -> Result<Vec<ContainerRecord>> {
        let ids = self.store.list_keys(keys::CONTAINER_PREFIX).await?;
        let mut records = Vec::with_capacity(ids.len());
        for key in ids {
            if let Some(bytes) = self.store.get(&key).await? {
                records.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(records)
    }

    /// List every `ContainerRecord` owned by `tenant_id`.
    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<ContainerRecord>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|r| r.tenant_id == tenant_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use containerlease_core::InMemoryStore;

    fn sample(id: &str, tenant: &str, status: ContainerStatus) -> ContainerRecord {
        let now = Utc::now();
        ContainerRecord {
            id: id.to_string(),
            engine_id: String::new(),
            tenant_id: tenant.to_string(),
            image_type: "alpine".to_string(),
            status,
            cpu_milli: 500,
            memory_mb: 512,
            created_at: now,
            expiry_at: now + chrono::Duration::minutes(10),
            cost: 0.0,
            error_message: String::new(),
            volume_id: String::new(),
            volume_size_mb: 0,
            restart_count: 0,
            max_restarts: ContainerRecord::DEFAULT_MAX_RESTARTS,
            last_failure_time: None,
            failure_reason: String::new(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let repo = ContainerRepo::new(Arc::new(InMemoryStore::new()), Duration::from_secs(900));
        let record = sample("c1", "tenant-a", ContainerStatus::Pending);
        repo.put(&record).await.unwrap();
        let fetched = repo.get("c1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "c1");
        assert_eq!(fetched.tenant_id, "tenant-a");
    }

    #[tokio::test]
    async fn get_owned_rejects_foreign_tenant() {
        let repo = ContainerRepo::new(Arc::new(InMemoryStore::new()), Duration::from_secs(900));
        repo.put(&sample("c1", "tenant-a", ContainerStatus::Running)).await.unwrap();
        let result = repo.get_owned("c1", "tenant-b", false).await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn get_owned_admin_bypasses_ownership() {
        let repo = ContainerRepo::new(Arc::new(InMemoryStore::new()), Duration::from_secs(900));
        repo.put(&sample("c1", "tenant-a", ContainerStatus::Running)).await.unwrap();
        let result = repo.get_owned("c1", "tenant-b", true).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn list_by_tenant_filters() {
        let repo = ContainerRepo::new(Arc::new(InMemoryStore::new()), Duration::from_secs(900));
        repo.put(&sample("c1", "tenant-a", ContainerStatus::Running)).await.unwrap();
        repo.put(&sample("c2", "tenant-b", ContainerStatus::Running)).await.unwrap();
        let records = repo.list_by_tenant("tenant-a").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "c1");
    }
}
