// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Adapter over the single-node container runtime (spec §4.2): the
//! [`RuntimeEngine`] trait contract, a retry/circuit-breaker decorator
//! ([`GuardedRuntimeEngine`]), and an in-process test double
//! ([`MockRuntimeEngine`]).

pub mod guarded;
pub mod mock;
pub mod traits;

pub use guarded::GuardedRuntimeEngine;
pub use mock::MockRuntimeEngine;
pub use traits::{
    CancelToken, ContainerMetrics, CreateOptions, LogChunk, LogStream, Result, RuntimeEngine,
    RuntimeEngineError,
};
