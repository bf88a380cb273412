// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis-backed [`Store`] implementation.
//!
//! Redis's native key expiry (`PX`/`EXPIRE`) maps directly onto the TTL
//! semantics this trait requires, and `SADD`/`SREM`/`SMEMBERS` give us the
//! snapshot index sets for free.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{Store, StoreError, StoreResult, Ttl};

/// A [`Store`] backed by a single Redis (or Redis-compatible) instance,
/// reached through a lazily-reconnecting [`ConnectionManager`].
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        // `SETEX` only takes whole seconds; round up so a key never expires
        // before its caller-requested TTL has actually elapsed.
        let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        conn.set_ex::<_, _, ()>(key, value, secs.max(1))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        conn.keys(pattern)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Ttl> {
        let mut conn = self.conn.clone();
        let secs: i64 = conn
            .ttl(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(match secs {
            -2 => Ttl::Missing,
            -1 => Ttl::None,
            n => Ttl::Remaining(Duration::from_secs(n as u64)),
        })
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.smembers(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
