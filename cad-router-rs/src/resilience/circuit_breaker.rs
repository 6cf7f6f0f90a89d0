//! Circuit breaker implementation for preventing cascading failures
//!
//! This module implements the circuit breaker pattern to stop sending calls
//! to a CAD application instance that keeps failing. All state transitions of
//! one breaker are serialized behind a single mutex; the wrapped call itself
//! runs outside the lock.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::CircuitState;
use crate::error::mapping::counts_against_breaker;
use crate::error::{Result, RouterError};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// How long the circuit stays open after the last failure before a probe is allowed
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
}

/// How a call admitted by the breaker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// Caller-side error; the external resource was not at fault
    Neutral,
}

/// A thread-safe circuit breaker implementation
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    total_rejections: AtomicU64,
}

/// Admission ticket for one call.
///
/// Settle it with [`CallPermit::success`], [`CallPermit::failure`] or
/// [`CallPermit::neutral`]. A probe permit dropped unsettled counts as a
/// failed probe, so an abandoned probe cannot wedge the breaker in half-open.
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call is the half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settle(Outcome::Success);
    }

    pub fn failure(mut self) {
        self.settle(Outcome::Failure);
    }

    pub fn neutral(mut self) {
        self.settle(Outcome::Neutral);
    }

    fn settle(&mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.settle(self.probe, outcome);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let outcome = if self.probe { Outcome::Failure } else { Outcome::Neutral };
            self.settle(outcome);
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the specified configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                status: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                probe_in_flight: false,
            }),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute a call under breaker protection.
    ///
    /// In `Open` the call is rejected with `CircuitOpen` and `operation` is
    /// never invoked. Errors returned by the call are passed through unchanged.
    pub async fn protect<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.try_acquire()?;
        let result = operation().await;

        match &result {
            Ok(_) => permit.success(),
            Err(err) if counts_against_breaker(err) => permit.failure(),
            Err(_) => permit.neutral(),
        }

        result
    }

    /// Ask the breaker to admit one call
    pub fn try_acquire(&self) -> Result<CallPermit<'_>> {
        let mut state = self.lock();

        match state.status {
            CircuitState::Closed => Ok(self.permit(false)),
            CircuitState::Open => {
                let elapsed = state.last_failure.map(|at| at.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed < self.config.open_duration => {
                        drop(state);
                        let remaining = self.config.open_duration - elapsed;
                        Err(self.reject(format!(
                            "circuit '{}' is open, next probe in {}ms",
                            self.name,
                            remaining.as_millis()
                        )))
                    }
                    _ => {
                        state.status = CircuitState::HalfOpen;
                        state.probe_in_flight = true;
                        info!(breaker = %self.name, "Circuit breaker transitioning to HalfOpen, admitting probe");
                        Ok(self.permit(true))
                    }
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    drop(state);
                    Err(self.reject(format!(
                        "circuit '{}' is half-open and a probe is already in flight",
                        self.name
                    )))
                } else {
                    state.probe_in_flight = true;
                    debug!(breaker = %self.name, "Admitting half-open probe");
                    Ok(self.permit(true))
                }
            }
        }
    }

    fn permit(&self, probe: bool) -> CallPermit<'_> {
        CallPermit {
            breaker: self,
            probe,
            settled: false,
        }
    }

    fn reject(&self, message: String) -> RouterError {
        self.total_rejections.fetch_add(1, Ordering::Relaxed);
        debug!(breaker = %self.name, "{}", message);
        RouterError::circuit_open(message)
    }

    fn settle(&self, probe: bool, outcome: Outcome) {
        let mut state = self.lock();

        match outcome {
            Outcome::Success => {
                self.total_successes.fetch_add(1, Ordering::Relaxed);
                if probe {
                    state.status = CircuitState::Closed;
                    state.consecutive_failures = 0;
                    state.last_failure = None;
                    state.probe_in_flight = false;
                    info!(breaker = %self.name, "Probe succeeded, circuit breaker transitioning to Closed");
                } else if state.status == CircuitState::Closed {
                    state.consecutive_failures = 0;
                }
            }
            Outcome::Failure => {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                state.last_failure = Some(Instant::now());

                if probe {
                    state.status = CircuitState::Open;
                    state.probe_in_flight = false;
                    warn!(breaker = %self.name, "Probe failed, circuit breaker transitioning back to Open");
                } else if state.status == CircuitState::Closed
                    && state.consecutive_failures >= self.config.failure_threshold
                {
                    state.status = CircuitState::Open;
                    warn!(
                        breaker = %self.name,
                        failures = state.consecutive_failures,
                        "Circuit breaker transitioning to Open"
                    );
                }
            }
            Outcome::Neutral => {
                if probe {
                    // The probe proved nothing; let the next caller probe again.
                    state.probe_in_flight = false;
                }
            }
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.lock();
        state.status = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.last_failure = None;
        state.probe_in_flight = false;
        info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Get the current circuit status.
    ///
    /// An open circuit whose open duration has elapsed still reports `Open`
    /// until the next call turns into the probe.
    pub fn status(&self) -> CircuitState {
        self.lock().status
    }

    /// Get the current number of consecutive failures
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Point-in-time view of the breaker
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            status: state.status,
            consecutive_failures: state.consecutive_failures,
            since_last_failure: state.last_failure.map(|at| at.elapsed()),
            probe_in_flight: state.probe_in_flight,
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }
}

/// Metrics for a circuit breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub status: CircuitState,
    pub consecutive_failures: u32,
    pub since_last_failure: Option<Duration>,
    pub probe_in_flight: bool,
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_rejections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn breaker(threshold: u32, open_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                open_duration: Duration::from_millis(open_ms),
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<()> {
        cb.protect(|| async { Err::<(), _>(RouterError::connection("refused")) }).await
    }

    #[tokio::test]
    async fn test_circuit_closed_initially() {
        let cb = breaker(3, 1000);
        assert_eq!(cb.status(), CircuitState::Closed);
        assert!(cb.protect(|| async { Ok(1) }).await.is_ok());
    }

    #[tokio::test]
    async fn test_circuit_opens_after_threshold() {
        let cb = breaker(3, 60_000);

        assert!(fail(&cb).await.is_err());
        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.status(), CircuitState::Closed);

        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.status(), CircuitState::Open);

        let calls = AtomicUsize::new(0);
        let result = cb
            .protect(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.snapshot().total_rejections, 1);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let cb = breaker(3, 60_000);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        cb.protect(|| async { Ok(()) }).await.unwrap();
        assert_eq!(cb.failure_count(), 0);
        let _ = fail(&cb).await;
        assert_eq!(cb.status(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_caller_errors_do_not_trip() {
        let cb = breaker(1, 60_000);
        let result = cb
            .protect(|| async { Err::<(), _>(RouterError::validation("bad depth")) })
            .await;
        assert!(result.is_err());
        assert_eq!(cb.status(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_probe_success_closes() {
        let cb = breaker(1, 20);
        let _ = fail(&cb).await;
        assert_eq!(cb.status(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        cb.protect(|| async { Ok(()) }).await.unwrap();
        assert_eq!(cb.status(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_reopens_and_restarts_timer() {
        let cb = breaker(1, 30);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.status(), CircuitState::Open);
        let err = cb.protect(|| async { Ok(()) }).await.unwrap_err();
        assert!(err.is_circuit_open());
    }

    #[tokio::test]
    async fn test_only_one_probe_in_flight() {
        let cb = Arc::new(breaker(1, 20));
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let probe = cb.try_acquire().expect("first caller becomes the probe");
        assert!(probe.is_probe());
        assert_eq!(cb.status(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().unwrap_err().is_circuit_open());

        probe.success();
        assert_eq!(cb.status(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn test_dropped_probe_counts_as_failure() {
        let cb = breaker(1, 20);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        {
            let _probe = cb.try_acquire().unwrap();
        }
        assert_eq!(cb.status(), CircuitState::Open);
        assert!(!cb.snapshot().probe_in_flight);
    }

    #[tokio::test]
    async fn test_neutral_probe_releases_slot() {
        let cb = breaker(1, 20);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let result = cb
            .protect(|| async { Err::<(), _>(RouterError::validation("bad")) })
            .await;
        assert!(result.is_err());
        assert_eq!(cb.status(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().unwrap().is_probe());
    }

    #[test]
    fn test_reset() {
        let cb = breaker(1, 60_000);
        cb.try_acquire().unwrap().failure();
        assert_eq!(cb.status(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.status(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }
}
