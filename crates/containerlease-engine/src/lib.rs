// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lease-and-reconciliation engine for short-lived, tenant-owned compute
//! containers: synchronous admission, an asynchronous provisioning driver,
//! snapshot lifecycle, and the background reconciler that guarantees no
//! container outlives its lease.
//!
//! # Layout
//! - [`config`] — environment-variable configuration.
//! - [`presets`] — static resource bundles offered to callers.
//! - [`repo`] — typed `ContainerRecord`/`LeaseRecord`/`SnapshotRecord` access
//!   over [`containerlease_core::Store`].
//! - [`runtime_engine`] — the `RuntimeEngine` adapter contract, its
//!   retry/circuit-breaker decorator, and an in-process test double.
//! - [`provision_service`] — synchronous admission plus the async
//!   provisioning driver.
//! - [`snapshot_service`] — commit-to-image lifecycle.
//! - [`reconciler`] — the periodic sweeper that drives expired or orphaned
//!   records to `terminated`.
//! - [`chaos_injector`] — optional fault-injection worker.

pub mod chaos_injector;
pub mod config;
pub mod presets;
pub mod provision_service;
pub mod reconciler;
pub mod repo;
pub mod runtime_engine;
pub mod snapshot_service;

pub use chaos_injector::{ChaosInjector, ChaosInjectorConfig};
pub use config::{Config, ConfigError};
pub use provision_service::{ProvisionRequest, ProvisionService};
pub use reconciler::{Reconciler, ReconcilerConfig, ReconcilerStats};
pub use snapshot_service::{RestoreOptions, SnapshotService};
