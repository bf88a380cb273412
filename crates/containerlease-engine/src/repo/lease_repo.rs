// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed `LeaseRecord` access over the TTL store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use containerlease_core::store::keys;
use containerlease_core::{LeaseRecord, Result, Store};

/// Reads and writes [`LeaseRecord`]s. The Store's own TTL on the `lease:`
/// key is a defense-in-depth backstop; the reconciler is the actual
/// authority that drives expired containers to `terminated`.
pub struct LeaseRepo {
    store: Arc<dyn Store>,
}

impl LeaseRepo {
    /// Construct a repo over `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a lease expiring at `expiry_at`.
    pub async fn create(&self, container_id: &str, expiry_at: chrono::DateTime<Utc>, duration_minutes: u32) -> Result<()> {
        let record = LeaseRecord {
            container_id: container_id.to_string(),
            expiry_at,
            duration_minutes,
            created_at: Utc::now(),
        };
        let ttl = (expiry_at - Utc::now()).num_seconds().max(1) as u64;
        let bytes = serde_json::to_vec(&record)?;
        self.store
            .put(&keys::lease(container_id), &bytes, Duration::from_secs(ttl))
            .await?;
        Ok(())
    }

    /// Fetch the lease for `container_id`, if it still exists.
    pub async fn get(&self, container_id: &str) -> Result<Option<LeaseRecord>> {
        match self.store.get(&keys::lease(container_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete the lease for `container_id`. Deleting an absent lease is not
    /// an error (the reconciler's cleanup path is idempotent).
    pub async fn delete(&self, container_id: &str) -> Result<()> {
        self.store.delete(&keys::lease(container_id)).await?;
        Ok(())
    }

    /// List every lease whose `expiry_at` is at or before `now`. Eventually
    /// consistent like [`ContainerRepo::list_all`](crate::repo::ContainerRepo::list_all);
    /// the reconciler primarily drives off `ContainerRecord.expiry_at`
    /// directly and uses this only for lease-side audits.
    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<LeaseRecord>> {
        let keys = self.store.list_keys(keys::LEASE_PREFIX).await?;
        let mut expired = Vec::new();
        for key in keys {
            if let Some(bytes) = self.store.get(&key).await? {
                let lease: LeaseRecord = serde_json::from_slice(&bytes)?;
                if lease.expiry_at <= now {
                    expired.push(lease);
                }
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use containerlease_core::InMemoryStore;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = LeaseRepo::new(Arc::new(InMemoryStore::new()));
        let expiry = Utc::now() + chrono::Duration::minutes(10);
        repo.create("c1", expiry, 10).await.unwrap();
        let lease = repo.get("c1").await.unwrap().unwrap();
        assert_eq!(lease.container_id, "c1");
        assert_eq!(lease.duration_minutes, 10);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let repo = LeaseRepo::new(Arc::new(InMemoryStore::new()));
        repo.delete("missing").await.unwrap();
        let expiry = Utc::now() + chrono::Duration::minutes(1);
        repo.create("c1", expiry, 1).await.unwrap();
        repo.delete("c1").await.unwrap();
        repo.delete("c1").await.unwrap();
        assert!(repo.get("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_expired_filters_by_expiry() {
        let repo = LeaseRepo::new(Arc::new(InMemoryStore::new()));
        let now = Utc::now();
        // The store clamps TTL to a minimum of 1s, so an already-past
        // `expiry_at` still round-trips long enough for this read.
        repo.create("already-expired", now - chrono::Duration::seconds(30), 1).await.unwrap();
        repo.create("still-active", now + chrono::Duration::minutes(10), 10).await.unwrap();
        let expired = repo.list_expired(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].container_id, "already-expired");
    }
}
