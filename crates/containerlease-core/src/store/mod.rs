// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! TTL-indexed key/value facade used as the primary record store and as the
//! source of expiry truth.

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

/// Failures surfaced by a [`Store`] implementation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend connection or command failed.
    #[error("store backend error: {0}")]
    Backend(String),
    /// An in-process lock was poisoned by a panicking holder.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result alias over [`StoreError`].
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Remaining time-to-live for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key carries the given remaining TTL.
    Remaining(Duration),
    /// The key exists but carries no TTL.
    None,
    /// The key does not exist.
    Missing,
}

/// TTL key/value contract. Every ContainerLease component that touches
/// persistent state goes through this trait rather than talking to a
/// concrete backend directly, mirroring the `Persistence` trait seam in
/// the teacher's core crate.
#[async_trait]
pub trait Store: Send + Sync {
    /// Replace `key` atomically with `value`, set to expire after `ttl`.
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Fetch the raw value stored at `key`, if any.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Remove `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// List all keys starting with `prefix`. Eventually consistent: callers
    /// (the reconciler) must tolerate missing or duplicate entries.
    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Remaining TTL for `key`.
    async fn ttl(&self, key: &str) -> StoreResult<Ttl>;

    /// Add `member` to the set stored at `key`.
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Remove `member` from the set stored at `key`.
    async fn srem(&self, key: &str, member: &str) -> StoreResult<()>;

    /// List all members of the set stored at `key`.
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;
}

/// Key-prefix layout for everything this crate persists in `Store`.
pub mod keys {
    /// Prefix for `ContainerRecord` entries.
    pub fn container(id: &str) -> String {
        format!("container:{id}")
    }

    /// Prefix for `LeaseRecord` entries.
    pub fn lease(id: &str) -> String {
        format!("lease:{id}")
    }

    /// Prefix for `SnapshotRecord` entries.
    pub fn snapshot(id: &str) -> String {
        format!("snapshot:{id}")
    }

    /// Set of snapshot ids committed from a container.
    pub fn container_snapshots(container_id: &str) -> String {
        format!("container_snapshots:{container_id}")
    }

    /// Set of snapshot ids owned by a tenant.
    pub fn tenant_snapshots(tenant_id: &str) -> String {
        format!("tenant_snapshots:{tenant_id}")
    }

    /// Prefix under which every `ContainerRecord` lives, for `list_keys`.
    pub const CONTAINER_PREFIX: &str = "container:";

    /// Prefix under which every `LeaseRecord` lives, for `list_keys`.
    pub const LEASE_PREFIX: &str = "lease:";
}
