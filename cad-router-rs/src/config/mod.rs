//! Configuration management for the CAD router
//!
//! This module provides utilities for loading and validating router
//! configuration, with support for environment variables and in-memory values.
//! Every setting has a default; a key that is present but malformed is an error.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::analysis::AnalyzerConfig;
use crate::error::{Result, RouterError};
use crate::pool::PoolConfig;
use crate::resilience::{BreakerScope, CircuitBreakerConfig, RetryConfig};
use crate::script::ScriptConfig;
use crate::util::parse_duration;

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;

    /// Whether the provider has a value for `key`
    fn contains(&self, key: &str) -> bool {
        self.get_string(key).is_ok()
    }
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get a typed value, falling back to `default` only when the key is absent
    fn get_parsed_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        <T as FromStr>::Err: std::fmt::Display,
    {
        if !self.contains(key) {
            return Ok(default);
        }
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<T>()
            .map_err(|e| RouterError::configuration(format!("Invalid value for key {}: {}", key, e)))
    }

    /// Get a duration (`250ms`, `30s`, `5m`, `1h`, bare seconds) with a default
    fn get_duration_or(&self, key: &str, default: Duration) -> Result<Duration> {
        if !self.contains(key) {
            return Ok(default);
        }
        let value = self.get_string(key)?;
        parse_duration(&value).ok_or_else(|| {
            RouterError::configuration(format!("Invalid duration for key {}: {}", key, value))
        })
    }

    /// Get a string configuration value with a default
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,

    /// Optional namespace for variables (e.g., "STAGING")
    namespace: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment variable config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix for environment variables
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set a namespace for environment variables
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        if let Some(ref namespace) = self.namespace {
            env_key.push_str(namespace);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));

        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => {
                RouterError::configuration(format!("Environment variable not set: {}", env_key))
            }
            env::VarError::NotUnicode(_) => RouterError::configuration(format!(
                "Environment variable is not valid unicode: {}",
                env_key
            )),
        })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    /// Create a new empty memory config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory config provider with initial values
    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Set a configuration value
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| RouterError::configuration(format!("Configuration key not found: {}", key)))
    }
}

/// A composite config provider that tries multiple providers in order
#[derive(Default)]
pub struct CompositeConfigProvider {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl CompositeConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the end of the chain
    pub fn add_provider(&mut self, provider: impl ConfigProvider + 'static) {
        self.providers.push(Box::new(provider));
    }

    /// Add a provider and return self (builder pattern)
    pub fn with_provider(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.add_provider(provider);
        self
    }
}

impl ConfigProvider for CompositeConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.providers
            .iter()
            .find_map(|provider| provider.get_string(key).ok())
            .ok_or_else(|| {
                RouterError::configuration(format!(
                    "Configuration key not found in any provider: {}",
                    key
                ))
            })
    }
}

/// Global default configuration provider (`CADROUTER_*` variables)
pub static DEFAULT_PROVIDER: Lazy<Arc<EnvConfigProvider>> =
    Lazy::new(|| Arc::new(EnvConfigProvider::new().with_prefix("CADROUTER")));

/// Complete router configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub analyzer: AnalyzerConfig,
    pub breaker: CircuitBreakerConfig,
    pub breaker_scope: BreakerScope,
    pub pool: PoolConfig,
    pub retry: RetryConfig,
    pub script: ScriptConfig,

    /// Widest call the automation bridge accepts
    pub max_direct_args: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            breaker_scope: BreakerScope::default(),
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            script: ScriptConfig::default(),
            max_direct_args: 12,
        }
    }
}

impl RouterConfig {
    /// Load configuration from the `CADROUTER_*` environment
    pub fn from_env() -> Result<Self> {
        Self::from_provider(&**DEFAULT_PROVIDER)
    }

    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = Self::default();

        let analyzer = AnalyzerConfig {
            direct_max_count: provider
                .get_parsed_or("analyzer_direct_max_count", defaults.analyzer.direct_max_count)?,
            hybrid_max_count: provider
                .get_parsed_or("analyzer_hybrid_max_count", defaults.analyzer.hybrid_max_count)?,
            direct_confidence: provider
                .get_parsed_or("analyzer_direct_confidence", defaults.analyzer.direct_confidence)?,
            hybrid_confidence: provider
                .get_parsed_or("analyzer_hybrid_confidence", defaults.analyzer.hybrid_confidence)?,
            script_confidence: provider
                .get_parsed_or("analyzer_script_confidence", defaults.analyzer.script_confidence)?,
            unknown_confidence: provider
                .get_parsed_or("analyzer_unknown_confidence", defaults.analyzer.unknown_confidence)?,
        };

        let breaker = CircuitBreakerConfig {
            failure_threshold: provider
                .get_parsed_or("breaker_failure_threshold", defaults.breaker.failure_threshold)?,
            open_duration: provider.get_duration_or("breaker_open_duration", defaults.breaker.open_duration)?,
        };
        let breaker_scope = provider.get_parsed_or("breaker_scope", defaults.breaker_scope)?;

        let pool = PoolConfig {
            max_size: provider.get_parsed_or("pool_max_size", defaults.pool.max_size)?,
            acquire_timeout: provider.get_duration_or("pool_acquire_timeout", defaults.pool.acquire_timeout)?,
            poll_interval: provider.get_duration_or("pool_poll_interval", defaults.pool.poll_interval)?,
        };

        let retry = RetryConfig {
            max_retries: provider.get_parsed_or("retry_max_retries", defaults.retry.max_retries)?,
            base_delay: provider.get_duration_or("retry_base_delay", defaults.retry.base_delay)?,
        };

        let script = ScriptConfig {
            module_name: provider.get_string_or("script_module_name", &defaults.script.module_name),
            procedure: provider.get_string_or("script_procedure", &defaults.script.procedure),
            extension: provider.get_string_or("script_extension", &defaults.script.extension),
            directory: provider.get_string("script_directory").ok().map(PathBuf::from),
        };

        let config = Self {
            analyzer,
            breaker,
            breaker_scope,
            pool,
            retry,
            script,
            max_direct_args: provider.get_parsed_or("max_direct_args", defaults.max_direct_args)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate this configuration
    pub fn validate(&self) -> Result<()> {
        let analyzer = &self.analyzer;
        if analyzer.direct_max_count > analyzer.hybrid_max_count {
            return Err(RouterError::configuration(format!(
                "direct_max_count ({}) must not exceed hybrid_max_count ({})",
                analyzer.direct_max_count, analyzer.hybrid_max_count
            )));
        }

        for (name, value) in [
            ("direct_confidence", analyzer.direct_confidence),
            ("hybrid_confidence", analyzer.hybrid_confidence),
            ("script_confidence", analyzer.script_confidence),
            ("unknown_confidence", analyzer.unknown_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RouterError::configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.breaker.failure_threshold == 0 {
            return Err(RouterError::configuration("breaker failure_threshold must be at least 1"));
        }

        if self.breaker.open_duration.is_zero() {
            return Err(RouterError::configuration("breaker open_duration must be positive"));
        }

        if self.pool.max_size == 0 {
            return Err(RouterError::configuration("pool max_size must be at least 1"));
        }

        if self.pool.poll_interval.is_zero() {
            return Err(RouterError::configuration("pool poll_interval must be positive"));
        }

        if self.max_direct_args == 0 {
            return Err(RouterError::configuration("max_direct_args must be at least 1"));
        }

        self.script.validate()
    }
}
