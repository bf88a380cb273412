// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for containerlease-engine.

use std::time::Duration;

/// Engine configuration loaded from environment variables (spec §6
/// "Environment configuration").
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the external handlers would bind (transport itself is out of
    /// scope for this crate; retained so embedders have a single source of
    /// truth).
    pub port: u16,
    /// Connection string for the TTL store backend (e.g. `redis://...`).
    pub store_url: String,
    /// Host:port of the container runtime the `RuntimeEngine` adapter talks to.
    pub runtime_engine_addr: String,
    /// How often the reconciler sweeps for expired or orphaned records.
    pub cleanup_interval: Duration,
    /// Minimum lease duration accepted by admission.
    pub min_duration_minutes: u32,
    /// Maximum lease duration accepted by admission.
    pub max_duration_minutes: u32,
    /// Maximum CPU share (milli-cores) a single container may request.
    pub max_cpu_milli: u32,
    /// Maximum memory (megabytes) a single container may request.
    pub max_memory_mb: u32,
    /// Maximum attached volume size (megabytes).
    pub max_volume_size_mb: u32,
    /// Archive retention window after a record reaches `terminated`.
    pub archive_retention: Duration,
    /// Whether the chaos injector worker is enabled.
    pub chaos_enabled: bool,
    /// Whether snapshot endpoints are enabled.
    pub snapshots_enabled: bool,
    /// Origins the (out-of-CORE) transport layer should allow via CORS.
    /// Carried here so there is one source of truth even though CORS itself
    /// is out of scope for this crate.
    pub allowed_origins: Vec<String>,
    /// Signing key for identity tokens, consumed by the (out-of-CORE)
    /// credential-verification layer. Never logged.
    pub signing_key: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_url = std::env::var("CONTAINERLEASE_STORE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("CONTAINERLEASE_STORE_URL"))?;

        let port: u16 = std::env::var("CONTAINERLEASE_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("CONTAINERLEASE_PORT"))?;

        let runtime_engine_addr = std::env::var("CONTAINERLEASE_RUNTIME_ENGINE_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:2375".to_string());

        let cleanup_interval_secs: u64 = std::env::var("CONTAINERLEASE_CLEANUP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let min_duration_minutes = std::env::var("CONTAINERLEASE_MIN_DURATION_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let max_duration_minutes = std::env::var("CONTAINERLEASE_MAX_DURATION_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(240);

        let max_cpu_milli = std::env::var("CONTAINERLEASE_MAX_CPU_MILLI")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4000);

        let max_memory_mb = std::env::var("CONTAINERLEASE_MAX_MEMORY_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8192);

        let max_volume_size_mb = std::env::var("CONTAINERLEASE_MAX_VOLUME_SIZE_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10240);

        let archive_retention_secs: u64 = std::env::var("CONTAINERLEASE_ARCHIVE_RETENTION_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15 * 60);

        let chaos_enabled = std::env::var("CONTAINERLEASE_CHAOS_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let snapshots_enabled = std::env::var("CONTAINERLEASE_SNAPSHOTS_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        let allowed_origins = std::env::var("CONTAINERLEASE_ALLOWED_ORIGINS")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let signing_key = std::env::var("CONTAINERLEASE_SIGNING_KEY").unwrap_or_default();

        if min_duration_minutes == 0 || min_duration_minutes > max_duration_minutes {
            return Err(ConfigError::InvalidValue("CONTAINERLEASE_MIN_DURATION_MINUTES"));
        }

        Ok(Self {
            port,
            store_url,
            runtime_engine_addr,
            cleanup_interval: Duration::from_secs(cleanup_interval_secs),
            min_duration_minutes,
            max_duration_minutes,
            max_cpu_milli,
            max_memory_mb,
            max_volume_size_mb,
            archive_retention: Duration::from_secs(archive_retention_secs),
            chaos_enabled,
            snapshots_enabled,
            allowed_origins,
            signing_key,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// An environment variable was present but could not be parsed, or the
    /// parsed value is out of range.
    #[error("invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
