// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Crate-wide error type shared by every ContainerLease component.

/// Result alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of everything that can go wrong in the lease-and-reconciliation
/// engine. Every async component returns one of these so that callers at the
/// edge (admission handlers, the reconciler, tests) can react by kind rather
/// than by matching error strings.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Caller input was rejected (image not in allow-list, bounds exceeded, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// No record exists for the given id.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller does not own the record it tried to read or mutate.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The requested action conflicts with the record's current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store or runtime engine failed in a way retry could not absorb.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// The runtime engine's circuit breaker is open; the caller may retry later.
    #[error("circuit open: {0}")]
    CircuitOpen(String),

    /// An invariant was violated. Should never happen; logged with context.
    #[error("internal error: {0}")]
    Internal(String),

    /// Store backend failure (Redis, in-memory lock poisoning, ...).
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// JSON (de)serialization of a stored record failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True when the caller may usefully retry the operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Infrastructure(_) | Error::CircuitOpen(_) | Error::Store(_)
        )
    }
}
