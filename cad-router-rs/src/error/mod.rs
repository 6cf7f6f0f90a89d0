//! Error handling for the CAD router
//!
//! This module provides the error taxonomy shared by every component:
//! - Categorizes failures (validation, connection, circuit open, ...)
//! - Adds routing context (operation, strategy, attempts) to errors
//! - Combines the two causes of a failed hybrid request
//! - Provides a convenient Result type alias

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::Strategy;

pub mod mapping;

/// Result type for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// Main error type for the CAD router
#[derive(Error, Debug)]
pub enum RouterError {
    /// Malformed or out-of-range parameters, caught before any external call
    #[error("Validation error: {0}")]
    Validation(String),

    /// The external application could not be reached or a handle could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// The circuit breaker rejected the call without attempting it
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    /// The handle pool stayed exhausted for the whole acquisition timeout
    #[error("Acquisition timeout: {0}")]
    AcquisitionTimeout(String),

    /// The external application returned a null or failure signal
    #[error("External call failed: {0}")]
    ExternalCall(String),

    /// Internal templating failure
    #[error("Script generation error: {0}")]
    ScriptGeneration(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Script artifact could not be written or removed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors raised by handle implementations
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Both the direct attempt and its fallback failed
    #[error("direct attempt failed: {primary}; fallback failed: {fallback}")]
    Combined {
        primary: Box<RouterError>,
        fallback: Box<RouterError>,
    },

    /// Errors with additional context
    #[error("{inner}")]
    WithContext {
        inner: Box<RouterError>,
        context: ErrorContext,
    },
}

/// Classification of a [`RouterError`], stable across context wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Connection,
    CircuitOpen,
    AcquisitionTimeout,
    ExternalCall,
    ScriptGeneration,
    Configuration,
    Io,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Connection => "connection",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::AcquisitionTimeout => "acquisition_timeout",
            ErrorKind::ExternalCall => "external_call",
            ErrorKind::ScriptGeneration => "script_generation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Io => "io",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

impl RouterError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        RouterError::Validation(message.into())
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        RouterError::Connection(message.into())
    }

    /// Create a circuit open error
    pub fn circuit_open(message: impl Into<String>) -> Self {
        RouterError::CircuitOpen(message.into())
    }

    /// Create an acquisition timeout error
    pub fn acquisition_timeout(message: impl Into<String>) -> Self {
        RouterError::AcquisitionTimeout(message.into())
    }

    /// Create an external call error
    pub fn external_call(message: impl Into<String>) -> Self {
        RouterError::ExternalCall(message.into())
    }

    /// Create a script generation error
    pub fn script_generation(message: impl Into<String>) -> Self {
        RouterError::ScriptGeneration(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        RouterError::Configuration(message.into())
    }

    /// Combine the failure of a primary attempt with the failure of its fallback
    pub fn combined(primary: RouterError, fallback: RouterError) -> Self {
        RouterError::Combined {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
        }
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        RouterError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// Add a single context key/value to an existing error
    pub fn with_context_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        match self {
            RouterError::WithContext { inner, mut context } => {
                context.add(key, value);
                RouterError::WithContext { inner, context }
            }
            other => {
                let mut context = ErrorContext::new();
                context.add(key, value);
                other.with_context(context)
            }
        }
    }

    /// The classification of this error, looking through context wrappers.
    ///
    /// A combined error is classified by its fallback, the last thing that was tried.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouterError::Validation(_) => ErrorKind::Validation,
            RouterError::Connection(_) => ErrorKind::Connection,
            RouterError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            RouterError::AcquisitionTimeout(_) => ErrorKind::AcquisitionTimeout,
            RouterError::ExternalCall(_) => ErrorKind::ExternalCall,
            RouterError::ScriptGeneration(_) => ErrorKind::ScriptGeneration,
            RouterError::Configuration(_) => ErrorKind::Configuration,
            RouterError::Io(_) => ErrorKind::Io,
            RouterError::Other(_) => ErrorKind::Other,
            RouterError::Combined { fallback, .. } => fallback.kind(),
            RouterError::WithContext { inner, .. } => inner.kind(),
        }
    }

    /// The innermost error with context wrappers stripped
    pub fn root(&self) -> &RouterError {
        match self {
            RouterError::WithContext { inner, .. } => inner.root(),
            other => other,
        }
    }

    /// Context attached to this error, if any
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            RouterError::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Strategy that triggered this error, if recorded
    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            RouterError::WithContext { inner, context } => context.strategy.or_else(|| inner.strategy()),
            _ => None,
        }
    }

    /// Check if this error may be retried by the local retry budget.
    ///
    /// Only connection-class failures qualify.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    /// Check if this is a permanent error (not retryable)
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Whether this error is a breaker rejection
    pub fn is_circuit_open(&self) -> bool {
        self.kind() == ErrorKind::CircuitOpen
    }
}

/// Error context information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Operation that was being routed
    pub operation: Option<String>,

    /// Strategy that produced the failure
    pub strategy: Option<Strategy>,

    /// Number of attempts made, retries included
    pub attempts: Option<u32>,

    /// When the failure was recorded
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Request ID for tracing
    pub request_id: Option<String>,

    /// Additional context data
    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            operation: None,
            strategy: None,
            attempts: None,
            timestamp: chrono::Utc::now(),
            request_id: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new error context for a specific operation
    pub fn for_operation(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Self::default()
        }
    }

    /// Record the triggering strategy
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Record the attempt count
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Add a request ID
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Add a context value
    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
    }

    /// Add a context value and return self (builder pattern)
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.add(key, value);
        self
    }
}
