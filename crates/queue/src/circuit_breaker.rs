//! In-process circuit breaker (spec §4.3) protecting outbound calls —
//! primarily bus publishes, but the same type wraps any handler-initiated
//! outbound call the runtime wants to shield.
//!
//! State is per-target and atomic (spec §5), unlike the distributed,
//! Postgres-backed variant one might reach for across a fleet of workers;
//! a single `CircuitBreaker` is meant to be held behind an `Arc` and
//! shared by every task that calls the same downstream dependency.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Circuit breaker states (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

impl From<u8> for CircuitState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

impl From<CircuitState> for u8 {
    fn from(s: CircuitState) -> Self {
        match s {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

/// Tuning knobs, matching the defaults and env var names in spec §4.3/§6.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Build from the process environment (spec §6), falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("CIRCUIT_BREAKER_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
            failure_threshold: std::env::var("CIRCUIT_BREAKER_FAILURE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.failure_threshold),
            success_threshold: std::env::var("CIRCUIT_BREAKER_SUCCESS_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.success_threshold),
            reset_timeout: std::env::var("CIRCUIT_BREAKER_RESET_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.reset_timeout),
        }
    }
}

/// Stateful gate around an external dependency (spec §4.3/P8).
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: AtomicU8::new(CircuitState::Closed.into()),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            opened_at: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.maybe_transition_to_half_open();
        self.state.load(Ordering::SeqCst).into()
    }

    fn maybe_transition_to_half_open(&self) {
        if CircuitState::from(self.state.load(Ordering::SeqCst)) != CircuitState::Open {
            return;
        }
        let mut opened_at = self.opened_at.lock().unwrap();
        if let Some(at) = *opened_at {
            if at.elapsed() >= self.config.reset_timeout {
                self.state
                    .store(CircuitState::HalfOpen.into(), Ordering::SeqCst);
                self.success_count.store(0, Ordering::SeqCst);
                *opened_at = None;
            }
        }
    }

    /// Run `f` through the breaker. Fails fast with `QueueError::CircuitOpen`
    /// without calling `f` at all while the circuit is open.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, QueueError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            return f().await.map_err(|_| QueueError::CircuitOpen(self.name.clone()));
        }

        if self.state() == CircuitState::Open {
            return Err(QueueError::CircuitOpen(self.name.clone()));
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(_) => {
                self.record_failure();
                Err(QueueError::CircuitOpen(self.name.clone()))
            }
        }
    }

    fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    self.state.store(CircuitState::Closed.into(), Ordering::SeqCst);
                    self.failure_count.store(0, Ordering::SeqCst);
                    self.success_count.store(0, Ordering::SeqCst);
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.trip();
            }
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures > self.config.failure_threshold {
                    self.trip();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self) {
        self.state.store(CircuitState::Open.into(), Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        *self.opened_at.lock().unwrap() = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold,
            success_threshold: 2,
            reset_timeout: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn opens_after_failure_threshold_exceeded() {
        let breaker = CircuitBreaker::new("target", config(3));

        for _ in 0..3 {
            let _ = breaker.call(|| async { Err::<(), ()>(()) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _ = breaker.call(|| async { Err::<(), ()>(()) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker.call(|| async { Ok::<(), ()>(()) }).await;
        assert!(matches!(result, Err(QueueError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn half_open_probe_then_close_on_successes() {
        let breaker = CircuitBreaker::new("target", config(1));
        let _ = breaker.call(|| async { Err::<(), ()>(()) }).await;
        let _ = breaker.call(|| async { Err::<(), ()>(()) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.call(|| async { Ok::<(), ()>(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.call(|| async { Ok::<(), ()>(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new("target", config(1));
        let _ = breaker.call(|| async { Err::<(), ()>(()) }).await;
        let _ = breaker.call(|| async { Err::<(), ()>(()) }).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let _ = breaker.call(|| async { Err::<(), ()>(()) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
