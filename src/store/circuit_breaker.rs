//! Circuit breaker guarding the routing data store.
//!
//! States:
//! - Closed: calls pass through, consecutive failures are counted
//! - Open: calls are rejected until `open_timeout` has elapsed
//! - HalfOpen: trial calls pass, a failure reopens, enough successes close

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::telemetry::counters;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Successes in half-open state before closing
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Cooldown before trial calls are let through
    #[serde(default = "default_open_timeout", with = "crate::config::duration_serde")]
    pub open_timeout: Duration,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_success_threshold() -> u32 {
    1
}

fn default_open_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_timeout: default_open_timeout(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
    open_count: u64,
}

/// Circuit breaker for a store backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
                open_count: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // State stays consistent across a panic, every update is a plain store.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Check whether a call may proceed, moving Open to HalfOpen once the
    /// cooldown has elapsed.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_timeout)
                    .unwrap_or(false);
                if cooled {
                    debug!("store circuit breaker half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.successes = 0;
                    counters::store_breaker_transition(CircuitState::HalfOpen.as_str());
                }
                cooled
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    info!("store circuit breaker closed");
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.opened_at = None;
                    counters::store_breaker_transition(CircuitState::Closed.as_str());
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    Self::open(&mut inner);
                }
            }
            CircuitState::HalfOpen => Self::open(&mut inner),
            CircuitState::Open => {}
        }
    }

    fn open(inner: &mut Inner) {
        warn!(failures = inner.failures, "store circuit breaker opened");
        inner.state = CircuitState::Open;
        inner.successes = 0;
        inner.opened_at = Some(Instant::now());
        inner.open_count += 1;
        counters::store_breaker_transition(CircuitState::Open.as_str());
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    /// Total times the circuit has opened.
    pub fn open_count(&self) -> u64 {
        self.lock().open_count
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
