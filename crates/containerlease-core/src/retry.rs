// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded-attempt exponential backoff used to wrap every `RuntimeEngine`
//! call and the reconciler's per-record cleanup loop (spec §4.9).

use std::time::Duration;

use tokio::time::sleep;

/// Retry parameters: bounded attempts, exponential backoff with a cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Backoff multiplier applied after each failed attempt.
    pub multiplier: f64,
    /// Upper bound on any single backoff delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff instances tuned for the reconciler's per-record cleanup,
    /// whose delay is `attempt^2` seconds per spec §4.6.
    pub fn reconciler() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 4.0,
            max_backoff: Duration::from_secs(9),
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_backoff)
    }

    /// Run `op` until it succeeds or `max_attempts` is exhausted, sleeping
    /// between attempts according to the configured backoff. The sleep is a
    /// suspension point and observes `cancel` so a shutting-down caller does
    /// not block exit.
    pub async fn run<T, E, F, Fut>(&self, cancel: &tokio::sync::Notify, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1);
                    tokio::select! {
                        biased;
                        _ = cancel.notified() => return Err(err),
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }
}
