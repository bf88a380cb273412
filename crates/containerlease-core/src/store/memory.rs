// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process `Store` used by unit and integration tests, modeled on the
//! `Arc<Mutex<HashMap<..>>>` test-double style used throughout this codebase.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{Store, StoreError, StoreResult, Ttl};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// An in-memory [`Store`] backed by a mutex-guarded hash map. Entries are
/// lazily evicted on access; there is no background sweep, matching how the
/// real TTL backend's expiry would only become visible on the next read.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
}

impl InMemoryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)
    }

    fn lock_sets(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, HashSet<String>>>> {
        self.sets.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let mut entries = self.lock_entries()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut entries = self.lock_entries()?;
        let now = Instant::now();
        if let Some(entry) = entries.get(key) {
            if entry.is_expired(now) {
                entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.lock_entries()?.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.lock_entries()?;
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Ttl> {
        let mut entries = self.lock_entries()?;
        let now = Instant::now();
        match entries.get(key) {
            None => Ok(Ttl::Missing),
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(Ttl::Missing)
            }
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => Ok(Ttl::Remaining(at.saturating_duration_since(now))),
            Some(Entry {
                expires_at: None, ..
            }) => Ok(Ttl::None),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()> {
        self.lock_sets()?
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
        if let Some(set) = self.lock_sets()?.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .lock_sets()?
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryStore::new();
        store
            .put("container:c1", b"hello", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("container:c1").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_missing() {
        let store = InMemoryStore::new();
        store
            .put("lease:c1", b"x", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("lease:c1").await.unwrap(), None);
        assert_eq!(store.ttl("lease:c1").await.unwrap(), Ttl::Missing);
    }

    #[tokio::test]
    async fn list_keys_filters_by_prefix() {
        let store = InMemoryStore::new();
        store.put("container:a", b"1", Duration::from_secs(60)).await.unwrap();
        store.put("lease:a", b"1", Duration::from_secs(60)).await.unwrap();
        let keys = store.list_keys("container:").await.unwrap();
        assert_eq!(keys, vec!["container:a".to_string()]);
    }

    #[tokio::test]
    async fn set_membership_add_remove() {
        let store = InMemoryStore::new();
        store.sadd("tenant_snapshots:t1", "s1").await.unwrap();
        store.sadd("tenant_snapshots:t1", "s2").await.unwrap();
        let mut members = store.smembers("tenant_snapshots:t1").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["s1".to_string(), "s2".to_string()]);
        store.srem("tenant_snapshots:t1", "s1").await.unwrap();
        assert_eq!(store.smembers("tenant_snapshots:t1").await.unwrap(), vec!["s2".to_string()]);
    }
}
