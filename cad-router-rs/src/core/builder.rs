//! Orchestrator builder implementation
//!
//! Provides a builder pattern for creating and configuring a
//! [`RoutingOrchestrator`](crate::router::RoutingOrchestrator).

use std::sync::Arc;
use std::time::Duration;

use super::{CadHandle, HandleFactory};
use crate::analysis::AnalyzerConfig;
use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::pool::PoolConfig;
use crate::resilience::{BreakerScope, CircuitBreakerConfig, RetryConfig};
use crate::router::{HandleSource, RoutingOrchestrator};
use crate::script::ScriptConfig;

/// Builder for the routing orchestrator
#[derive(Default)]
pub struct RouterBuilder {
    /// Base configuration; individual setters override its sections
    config: Option<RouterConfig>,

    /// Factory for a pooled handle source
    factory: Option<Arc<dyn HandleFactory>>,

    /// A single shared handle instead of a pool
    handle: Option<Arc<dyn CadHandle>>,

    analyzer: Option<AnalyzerConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    breaker_scope: Option<BreakerScope>,
    pool: Option<PoolConfig>,
    retry: Option<RetryConfig>,
    script: Option<ScriptConfig>,
    max_direct_args: Option<usize>,
}

impl RouterBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a complete configuration
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Create handles on demand through a bounded pool
    pub fn handle_factory(mut self, factory: Arc<dyn HandleFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Route every request through one shared handle
    pub fn single_handle(mut self, handle: Arc<dyn CadHandle>) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn analyzer(mut self, config: AnalyzerConfig) -> Self {
        self.analyzer = Some(config);
        self
    }

    /// Configure circuit breaker
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn breaker_scope(mut self, scope: BreakerScope) -> Self {
        self.breaker_scope = Some(scope);
        self
    }

    pub fn pool(mut self, config: PoolConfig) -> Self {
        self.pool = Some(config);
        self
    }

    /// Shorthand for the pool size
    pub fn max_handles(mut self, max_size: usize) -> Self {
        let mut pool = self.pool.take().unwrap_or_else(|| self.base_pool());
        pool.max_size = max_size;
        self.pool = Some(pool);
        self
    }

    /// Shorthand for the pool acquisition timeout
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        let mut pool = self.pool.take().unwrap_or_else(|| self.base_pool());
        pool.acquire_timeout = timeout;
        self.pool = Some(pool);
        self
    }

    /// Configure retry behavior
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn script(mut self, config: ScriptConfig) -> Self {
        self.script = Some(config);
        self
    }

    pub fn max_direct_args(mut self, max_args: usize) -> Self {
        self.max_direct_args = Some(max_args);
        self
    }

    fn base_pool(&self) -> PoolConfig {
        self.config.as_ref().map(|c| c.pool.clone()).unwrap_or_default()
    }

    /// Merge the overrides into the base configuration and validate it
    pub fn build_config(&self) -> Result<RouterConfig> {
        let mut config = self.config.clone().unwrap_or_default();

        if let Some(ref analyzer) = self.analyzer {
            config.analyzer = analyzer.clone();
        }
        if let Some(ref breaker) = self.circuit_breaker {
            config.breaker = breaker.clone();
        }
        if let Some(scope) = self.breaker_scope {
            config.breaker_scope = scope;
        }
        if let Some(ref pool) = self.pool {
            config.pool = pool.clone();
        }
        if let Some(ref retry) = self.retry {
            config.retry = retry.clone();
        }
        if let Some(ref script) = self.script {
            config.script = script.clone();
        }
        if let Some(max_args) = self.max_direct_args {
            config.max_direct_args = max_args;
        }

        config.validate()?;
        Ok(config)
    }

    /// Build the orchestrator
    pub fn build(self) -> Result<RoutingOrchestrator> {
        let config = self.build_config()?;

        let handles = match (self.factory, self.handle) {
            (Some(factory), None) => HandleSource::pool(factory, config.pool.clone()),
            (None, Some(handle)) => HandleSource::Single(handle),
            (Some(_), Some(_)) => {
                return Err(RouterError::configuration(
                    "configure either a handle factory or a single handle, not both",
                ))
            }
            (None, None) => {
                return Err(RouterError::configuration(
                    "a handle factory or a single handle is required",
                ))
            }
        };

        Ok(RoutingOrchestrator::new(config, handles))
    }
}
