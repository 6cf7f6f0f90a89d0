//! Resilience patterns for calls into the CAD application
//!
//! This module provides implementations of common resilience patterns:
//! - Retry with linear backoff
//! - Circuit breaker
//! - Breaker registry for shared or per-handle breakers
//! - Unified resilience facade

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{BreakerSnapshot, CallPermit, CircuitBreaker, CircuitBreakerConfig};
pub use retry::{RetryConfig, RetryExecutor};

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A unified resilience facade: retries outside, the breaker guarding every attempt
#[derive(Debug, Clone)]
pub struct Resilience {
    retry: RetryExecutor,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl Default for Resilience {
    fn default() -> Self {
        Self::new(RetryConfig::default(), CircuitBreakerConfig::default())
    }
}

impl Resilience {
    /// Create a new resilience facade with specified configurations
    pub fn new(retry_config: RetryConfig, circuit_breaker_config: CircuitBreakerConfig) -> Self {
        Self::with_breaker(
            RetryExecutor::new(retry_config),
            Arc::new(CircuitBreaker::new("default", circuit_breaker_config)),
        )
    }

    /// Compose an existing retry executor with a shared breaker
    pub fn with_breaker(retry: RetryExecutor, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            retry,
            circuit_breaker,
        }
    }

    /// Execute a fallible operation with all configured resilience patterns.
    ///
    /// A breaker rejection is not retried, so an open circuit costs no
    /// backoff delay and never reaches `operation`.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_counted(operation).await.0
    }

    /// Like [`Resilience::execute`], also reporting the number of attempts
    pub async fn execute_counted<F, Fut, T>(&self, mut operation: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let breaker = &self.circuit_breaker;
        self.retry
            .execute_counted(move || {
                let attempt = operation();
                breaker.protect(move || attempt)
            })
            .await
    }

    /// Get the current status of the circuit breaker
    pub fn circuit_breaker_status(&self) -> CircuitState {
        self.circuit_breaker.status()
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    /// Reset the circuit breaker state
    pub fn reset_circuit_breaker(&self) {
        self.circuit_breaker.reset();
    }
}

/// Status of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,

    /// Circuit is open, rejecting requests
    Open,

    /// Circuit is half-open, a single probe decides the next state
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Which breaker guards a given handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerScope {
    /// One breaker for the whole application
    #[default]
    Shared,
    /// One breaker per handle id
    PerHandle,
}

impl std::str::FromStr for BreakerScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "shared" => Ok(Self::Shared),
            "per_handle" => Ok(Self::PerHandle),
            other => Err(format!("unknown breaker scope '{}'", other)),
        }
    }
}

/// Hands out breakers according to a [`BreakerScope`]
#[derive(Debug)]
pub struct BreakerRegistry {
    scope: BreakerScope,
    config: CircuitBreakerConfig,
    shared: Arc<CircuitBreaker>,
    per_handle: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(scope: BreakerScope, config: CircuitBreakerConfig) -> Self {
        Self {
            scope,
            shared: Arc::new(CircuitBreaker::new("shared", config.clone())),
            config,
            per_handle: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> BreakerScope {
        self.scope
    }

    /// Breaker guarding calls on `handle_id`
    pub fn breaker_for(&self, handle_id: &str) -> Arc<CircuitBreaker> {
        match self.scope {
            BreakerScope::Shared => Arc::clone(&self.shared),
            BreakerScope::PerHandle => {
                let mut breakers = self.per_handle.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(breakers.entry(handle_id.to_string()).or_insert_with(|| {
                    Arc::new(CircuitBreaker::new(handle_id, self.config.clone()))
                }))
            }
        }
    }

    /// Snapshots of every breaker created so far
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        match self.scope {
            BreakerScope::Shared => vec![self.shared.snapshot()],
            BreakerScope::PerHandle => {
                let breakers = self.per_handle.lock().unwrap_or_else(PoisonError::into_inner);
                let mut snapshots: Vec<_> = breakers.values().map(|b| b.snapshot()).collect();
                snapshots.sort_by(|a, b| a.name.cmp(&b.name));
                snapshots
            }
        }
    }

    /// Reset every breaker to closed
    pub fn reset_all(&self) {
        self.shared.reset();
        let breakers = self.per_handle.lock().unwrap_or_else(PoisonError::into_inner);
        breakers.values().for_each(|b| b.reset());
    }
}
