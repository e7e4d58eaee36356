//! Circuit breaker with lock-free atomics.
//!
//! Closed until `failure_threshold` consecutive failures, then open for
//! `reset_timeout`, then half-open with a single probe. A probe success
//! closes the circuit; a probe failure reopens it.

use crate::config::BreakerFallback;
use crate::error::Error;
use crate::response::Response;
use crate::time::TimeSource;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Snapshot of breaker health.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failures: usize,
    pub successes: u64,
    pub is_healthy: bool,
}

pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicUsize,
    successes: AtomicU64,
    last_failure_millis: AtomicU64,
    probe_in_flight: AtomicBool,
    threshold: usize,
    reset_timeout: Duration,
    fallback: Option<BreakerFallback>,
    clock: Arc<dyn TimeSource>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.current_state())
            .field("threshold", &self.threshold)
            .field("reset_timeout", &self.reset_timeout)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(
        threshold: usize,
        reset_timeout: Duration,
        fallback: Option<BreakerFallback>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            failures: AtomicUsize::new(0),
            successes: AtomicU64::new(0),
            last_failure_millis: AtomicU64::new(0),
            probe_in_flight: AtomicBool::new(false),
            threshold,
            reset_timeout,
            fallback,
            clock,
        }
    }

    /// Gate an operation. An open circuit short-circuits without invoking
    /// the thunk, serving the fallback when one is configured.
    pub async fn call<Fut, Op>(&self, operation: Op) -> Result<Response, Error>
    where
        Fut: Future<Output = Result<Response, Error>>,
        Op: FnOnce() -> Fut,
    {
        let mut as_probe = false;
        loop {
            match self.state.load(Ordering::Acquire) {
                STATE_OPEN => {
                    let opened = self.last_failure_millis.load(Ordering::Acquire);
                    let elapsed = self.clock.now_millis().saturating_sub(opened);
                    let reset_ms = self.reset_timeout.as_millis() as u64;
                    if elapsed > reset_ms {
                        match self.state.compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        ) {
                            Ok(_) => {
                                self.probe_in_flight.store(false, Ordering::Release);
                                tracing::info!("circuit breaker half-open");
                                continue;
                            }
                            // Another caller transitioned; re-evaluate.
                            Err(_) => continue,
                        }
                    }
                    return self.reject(Duration::from_millis(reset_ms - elapsed));
                }
                STATE_HALF_OPEN => {
                    if self
                        .probe_in_flight
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        as_probe = true;
                        tracing::debug!("circuit breaker dispatching half-open probe");
                        break;
                    }
                    return self.reject(self.reset_timeout);
                }
                _ => break,
            }
        }

        let result = operation().await;
        match &result {
            Ok(_) => self.on_success(as_probe),
            Err(_) => self.on_failure(as_probe),
        }
        result
    }

    fn on_success(&self, as_probe: bool) {
        self.successes.fetch_add(1, Ordering::AcqRel);
        if as_probe {
            if self
                .state
                .compare_exchange(
                    STATE_HALF_OPEN,
                    STATE_CLOSED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                tracing::info!("circuit breaker closed after successful probe");
            }
            self.failures.store(0, Ordering::Release);
            self.probe_in_flight.store(false, Ordering::Release);
        } else if self.state.load(Ordering::Acquire) == STATE_CLOSED {
            self.failures.store(0, Ordering::Release);
        }
    }

    fn on_failure(&self, as_probe: bool) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if as_probe {
            if self
                .state
                .compare_exchange(
                    STATE_HALF_OPEN,
                    STATE_OPEN,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                self.last_failure_millis.store(self.clock.now_millis(), Ordering::Release);
                tracing::warn!(failures, "circuit breaker probe failed, reopening");
            }
            self.probe_in_flight.store(false, Ordering::Release);
        } else if failures >= self.threshold
            && self
                .state
                .compare_exchange(
                    STATE_CLOSED,
                    STATE_OPEN,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        {
            self.last_failure_millis.store(self.clock.now_millis(), Ordering::Release);
            tracing::error!(
                failures,
                threshold = self.threshold,
                "circuit breaker opened"
            );
        }
    }

    fn reject(&self, retry_in: Duration) -> Result<Response, Error> {
        let failures = self.failures.load(Ordering::Acquire);
        match &self.fallback {
            Some(fallback) => {
                tracing::debug!(failures, "circuit open, serving fallback");
                Ok(fallback())
            }
            None => Err(Error::CircuitOpen { failures, retry_in }),
        }
    }

    fn current_state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let state = self.current_state();
        let failures = self.failures.load(Ordering::Acquire);
        CircuitBreakerStats {
            state,
            failures,
            successes: self.successes.load(Ordering::Acquire),
            is_healthy: state == CircuitState::Closed && failures < self.threshold,
        }
    }

    /// Force the circuit closed and zero the failure count. The lifetime
    /// success counter is retained.
    pub fn reset(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.failures.store(0, Ordering::Release);
        self.last_failure_millis.store(0, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
        tracing::info!("circuit breaker reset to closed");
    }
}
