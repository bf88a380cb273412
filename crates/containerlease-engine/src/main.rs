// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! ContainerLease — Lease-and-Reconciliation Engine
//!
//! Boots the Store and RuntimeEngine, then runs the reconciler (and, if
//! enabled, the chaos injector) until a shutdown signal arrives. The
//! HTTP/WebSocket transport, credential verification, and CORS layers that
//! would normally sit in front of this engine — and that would in turn drive
//! `ProvisionService`/`SnapshotService` — are out of scope here (spec §1);
//! this binary wires only the always-on background workers and exits once
//! they stop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use containerlease_core::store::redis_store::RedisStore;
use containerlease_core::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy, Store};
use containerlease_engine::chaos_injector::{ChaosInjector, ChaosInjectorConfig};
use containerlease_engine::config::Config;
use containerlease_engine::reconciler::{Reconciler, ReconcilerConfig};
use containerlease_engine::repo::{ContainerRepo, LeaseRepo};
use containerlease_engine::runtime_engine::{GuardedRuntimeEngine, MockRuntimeEngine, RuntimeEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "containerlease=info".into()),
        )
        .init();

    if let Err(e) = dotenvy::dotenv() {
        warn!("no .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        port = config.port,
        store_url = %redact_store_url(&config.store_url),
        runtime_engine_addr = %config.runtime_engine_addr,
        cleanup_interval_secs = config.cleanup_interval.as_secs(),
        chaos_enabled = config.chaos_enabled,
        snapshots_enabled = config.snapshots_enabled,
        "starting containerlease engine"
    );

    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&config.store_url).await?);
    info!("connected to store");

    // The real OCI/crun backend behind `RuntimeEngine` is an injected
    // capability (spec §1, §6) supplied by the deployment; this binary wires
    // the in-process double so the engine is runnable standalone.
    let bare_runtime: Arc<dyn RuntimeEngine> = Arc::new(MockRuntimeEngine::new());
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
    breaker.set_on_state_change(|from, to| {
        warn!(from = ?from, to = ?to, "runtime engine circuit breaker transitioned");
    });
    let process_shutdown = Arc::new(tokio::sync::Notify::new());
    let runtime: Arc<dyn RuntimeEngine> = Arc::new(GuardedRuntimeEngine::new(
        bare_runtime,
        RetryPolicy::default(),
        breaker,
        Duration::from_secs(30),
        process_shutdown.clone(),
    ));

    let container_repo = Arc::new(ContainerRepo::new(store.clone(), config.archive_retention));
    let lease_repo = Arc::new(LeaseRepo::new(store.clone()));

    let reconciler = Arc::new(Reconciler::new(
        container_repo.clone(),
        lease_repo,
        runtime.clone(),
        ReconcilerConfig {
            interval: config.cleanup_interval,
        },
    ));
    let reconciler_shutdown = reconciler.shutdown_handle();
    let reconciler_handle = tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.run().await }
    });

    let chaos_handle = if config.chaos_enabled {
        let injector = Arc::new(ChaosInjector::new(container_repo, runtime, ChaosInjectorConfig::default()));
        let shutdown = injector.shutdown_handle();
        let handle = tokio::spawn(async move { injector.run().await });
        Some((handle, shutdown))
    } else {
        None
    };

    info!("containerlease engine ready");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    process_shutdown.notify_waiters();
    reconciler_shutdown.notify_waiters();
    if let Some((_, shutdown)) = &chaos_handle {
        shutdown.notify_waiters();
    }

    let shutdown_deadline = Duration::from_secs(30);
    if tokio::time::timeout(shutdown_deadline, reconciler_handle).await.is_err() {
        warn!("reconciler did not stop within the shutdown deadline");
    }
    if let Some((handle, _)) = chaos_handle {
        if tokio::time::timeout(shutdown_deadline, handle).await.is_err() {
            warn!("chaos injector did not stop within the shutdown deadline");
        }
    }

    info!("containerlease engine shut down");
    Ok(())
}

fn redact_store_url(url: &str) -> String {
    match url.split_once('@') {
        Some((_, host)) => format!("***@{host}"),
        None => url.to_string(),
    }
}
