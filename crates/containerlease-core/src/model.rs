// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Data model: [`ContainerRecord`], [`LeaseRecord`], [`SnapshotRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a [`ContainerRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    /// Record and lease committed; the runtime container does not exist yet.
    Pending,
    /// The runtime container exists and `engine_id` is set.
    Running,
    /// Provisioning failed; `error_message` carries the cause.
    Error,
    /// The runtime container exited on its own (e.g. chaos injection) and is
    /// awaiting a self-heal decision.
    Exited,
    /// The record reached its terminal state: no runtime container, no
    /// volume, lease deleted. Retained for the archive window.
    Terminated,
}

impl ContainerStatus {
    /// Statuses for which the reconciler still owns the record.
    pub fn is_active(self) -> bool {
        !matches!(self, ContainerStatus::Terminated)
    }
}

/// The authoritative per-container entity (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Opaque domain identifier.
    pub id: String,
    /// Runtime-assigned handle. Empty while `status == Pending`.
    pub engine_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Image chosen from the configured allow-list.
    pub image_type: String,
    /// Current lifecycle status.
    pub status: ContainerStatus,
    /// Requested CPU share in milli-cores.
    pub cpu_milli: u32,
    /// Requested memory in megabytes.
    pub memory_mb: u32,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Lease expiry instant; mirrors the paired [`LeaseRecord`].
    pub expiry_at: DateTime<Utc>,
    /// Settled cost in the configured currency unit. Monotonic non-decreasing.
    pub cost: f64,
    /// Terminal failure cause; empty unless `status == Error`.
    pub error_message: String,
    /// Attached volume id, empty if none was requested.
    pub volume_id: String,
    /// Attached volume size in megabytes.
    pub volume_size_mb: u32,
    /// Number of self-heal restarts performed so far.
    pub restart_count: u32,
    /// Maximum self-heal restarts before the record is cleaned up.
    pub max_restarts: u32,
    /// Instant of the most recent unexpected exit, if any.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Reason for the most recent unexpected exit, if any.
    pub failure_reason: String,
}

impl ContainerRecord {
    /// Default restart budget for self-healing containers.
    pub const DEFAULT_MAX_RESTARTS: u32 = 3;

    /// Seconds remaining until `expiry_at`, floored at zero.
    pub fn time_left_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expiry_at - now).num_seconds().max(0)
    }

    /// Whether the lease has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_at
    }

    /// Whether this record is eligible for a self-heal restart attempt.
    pub fn is_restart_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == ContainerStatus::Exited
            && self.restart_count < self.max_restarts
            && !self.is_expired(now)
    }
}

/// A time-bounded reservation tying a container to an `expiry_at`.
///
/// The reconciler's authority to destroy a container flows from the
/// existence of this record, not from the Store's own TTL expiry (which is
/// a defense-in-depth backstop, see spec §3 invariant 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Matches the owning [`ContainerRecord::id`].
    pub container_id: String,
    /// Mirrors [`ContainerRecord::expiry_at`].
    pub expiry_at: DateTime<Utc>,
    /// Requested lease length, informational (expiry_at is authoritative).
    pub duration_minutes: u32,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

/// A committed image of a running container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Opaque domain identifier.
    pub id: String,
    /// The container this snapshot was committed from.
    pub container_id: String,
    /// Must always equal the source container's tenant (spec §3 invariant 6).
    pub tenant_id: String,
    /// Runtime-engine image name/tag the commit produced.
    pub image_name: String,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Size of the committed image in bytes, if reported by the runtime.
    pub size_bytes: u64,
    /// Caller-supplied free-text description.
    pub description: String,
}

/// Hourly rate table consulted by `calculate_cost` (spec §4.6).
pub fn hourly_rate(image_type: &str) -> f64 {
    match image_type {
        "alpine" => 0.01,
        "ubuntu" => 0.04,
        _ => 0.04,
    }
}

/// `hourly_rate(image_type) * max(0, minutes) / 60`, never negative.
pub fn calculate_cost(image_type: &str, minutes: f64) -> f64 {
    hourly_rate(image_type) * minutes.max(0.0) / 60.0
}
