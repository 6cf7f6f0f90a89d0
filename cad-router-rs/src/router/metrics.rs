//! Running metrics and health reporting for the orchestrator

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pool::PoolStatus;
use crate::resilience::{BreakerScope, BreakerSnapshot, CircuitState};

/// Number of recent attempts in the latency window
const LATENCY_WINDOW: usize = 100;

/// Counters for every routed request and attempt
#[derive(Debug, Default)]
pub struct RouterMetrics {
    /// Requests submitted
    request_count: AtomicU64,

    /// Requests that returned a feature
    success_count: AtomicU64,

    /// Requests that returned an error
    failure_count: AtomicU64,

    direct_attempts: AtomicU64,
    script_attempts: AtomicU64,
    fallback_count: AtomicU64,
    retry_count: AtomicU64,
    rejection_count: AtomicU64,

    /// Latencies of the most recent attempts
    latencies: Mutex<VecDeque<Duration>>,
}

impl RouterMetrics {
    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_direct_attempt(&self) {
        self.direct_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_script_attempt(&self) {
        self.script_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallback_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retries(&self, retries: u32) {
        self.retry_count.fetch_add(u64::from(retries), Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejection_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the latency of one attempt
    pub fn record_latency(&self, latency: Duration) {
        let mut window = self.latencies.lock().unwrap_or_else(PoisonError::into_inner);
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(latency);
    }

    /// Average over the latency window, zero when nothing was recorded
    pub fn average_latency(&self) -> Duration {
        let window = self.latencies.lock().unwrap_or_else(PoisonError::into_inner);
        if window.is_empty() {
            return Duration::ZERO;
        }
        window.iter().sum::<Duration>() / window.len() as u32
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let average = self.average_latency();
        MetricsSnapshot {
            requests: self.request_count.load(Ordering::Relaxed),
            successes: self.success_count.load(Ordering::Relaxed),
            failures: self.failure_count.load(Ordering::Relaxed),
            direct_attempts: self.direct_attempts.load(Ordering::Relaxed),
            script_attempts: self.script_attempts.load(Ordering::Relaxed),
            fallbacks: self.fallback_count.load(Ordering::Relaxed),
            retries: self.retry_count.load(Ordering::Relaxed),
            breaker_rejections: self.rejection_count.load(Ordering::Relaxed),
            average_latency_ms: average.as_secs_f64() * 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub direct_attempts: u64,
    pub script_attempts: u64,
    pub fallbacks: u64,
    pub retries: u64,
    pub breaker_rejections: u64,
    pub average_latency_ms: f64,
}

/// Overall state derived from the breakers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every breaker is closed
    Healthy,
    /// Some breakers are open or probing
    Degraded,
    /// Every breaker is open
    Unavailable,
}

/// Serializable view returned by `RoutingOrchestrator::health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
    pub breaker_scope: BreakerScope,
    pub breakers: Vec<BreakerSnapshot>,
    pub pool: Option<PoolStatus>,
}

impl HealthReport {
    pub fn new(
        metrics: MetricsSnapshot,
        breaker_scope: BreakerScope,
        breakers: Vec<BreakerSnapshot>,
        pool: Option<PoolStatus>,
    ) -> Self {
        let open = breakers.iter().filter(|b| b.status != CircuitState::Closed).count();
        let status = if open == 0 {
            HealthStatus::Healthy
        } else if open == breakers.len() {
            HealthStatus::Unavailable
        } else {
            HealthStatus::Degraded
        };

        Self {
            status,
            timestamp: Utc::now(),
            metrics,
            breaker_scope,
            breakers,
            pool,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
