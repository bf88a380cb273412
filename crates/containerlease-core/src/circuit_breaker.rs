// Copyright (C) 2026 ContainerLease contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fast-fail gate in front of the `RuntimeEngine` (spec §4.9).

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observable state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass through normally.
    Closed,
    /// Requests are refused outright.
    Open,
    /// A single probe request is allowed through to test recovery.
    HalfOpen,
}

impl CircuitState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    fn tag(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

/// Tunables for [`CircuitBreaker`].
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `Closed` that trip the breaker to `Open`.
    pub failure_threshold: u32,
    /// How long `Open` holds before allowing a probe through as `HalfOpen`.
    pub open_timeout: Duration,
    /// Consecutive probe successes in `HalfOpen` needed to close the breaker.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Thread-safe three-state breaker: every counter and transition is atomic,
/// so callers never need to hold a lock across an await point.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    opened_at_millis: AtomicU64,
    epoch: Instant,
    on_state_change: Mutex<Option<Box<dyn Fn(CircuitState, CircuitState) + Send + Sync>>>,
}

impl CircuitBreaker {
    /// Construct a breaker in the `Closed` state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(CircuitState::Closed.tag()),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(0),
            epoch: Instant::now(),
            on_state_change: Mutex::new(None),
        }
    }

    /// Register a callback invoked exactly once per actual state transition.
    pub fn set_on_state_change<F>(&self, callback: F)
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        *self.on_state_change.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(callback));
    }

    fn transition(&self, from: CircuitState, to: CircuitState) {
        if self
            .state
            .compare_exchange(from.tag(), to.tag(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if let Ok(guard) = self.on_state_change.lock() {
                if let Some(cb) = guard.as_ref() {
                    cb(from, to);
                }
            }
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Current breaker state, first promoting `Open` to `HalfOpen` if the
    /// open timeout has elapsed.
    pub fn state(&self) -> CircuitState {
        let current = CircuitState::from_tag(self.state.load(Ordering::SeqCst));
        if current == CircuitState::Open {
            let opened_at = self.opened_at_millis.load(Ordering::SeqCst);
            if self.now_millis().saturating_sub(opened_at) >= self.config.open_timeout.as_millis() as u64 {
                self.transition(CircuitState::Open, CircuitState::HalfOpen);
                return CircuitState::HalfOpen;
            }
        }
        current
    }

    /// Whether a call should be allowed through right now.
    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    self.consecutive_successes.store(0, Ordering::SeqCst);
                    self.transition(CircuitState::HalfOpen, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.consecutive_successes.store(0, Ordering::SeqCst);
                self.open_now();
            }
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    self.open_now();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn open_now(&self) {
        let before = CircuitState::from_tag(self.state.load(Ordering::SeqCst));
        self.opened_at_millis.store(self.now_millis(), Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.transition(before, CircuitState::Open);
    }
}
