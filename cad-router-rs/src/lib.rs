//! # CAD Router
//!
//! Adaptive request routing and resilience for CAD automation.
//!
//! The CAD application's automation bridge marshals only a bounded number of
//! positional arguments per call. Operations that need more must run as a
//! script generated for, and executed inside, the application. This crate:
//!
//! - Analyzes each request's effective parameter count
//! - Chooses a direct call, a generated script, or direct-then-script (hybrid)
//! - Guards the application with circuit breakers and a bounded retry budget
//! - Manages a bounded pool of application handles
//! - Generates the fallback script text deterministically
//!
//! ## Architecture
//!
//! - `ComplexityAnalyzer`: pure mapping from requests to a `Strategy`
//! - `CircuitBreaker` / `Resilience`: per-handle or shared breakers, retries
//! - `HandlePool`: bounded pool over a `HandleFactory`
//! - `ScriptGenerator` / `ScriptStore`: VBA generation and scoped persistence
//! - `RoutingOrchestrator`: ties the above together behind `execute`
//! - `CadHandle`: the capability trait an application integration implements

pub mod analysis;
pub use analysis::{ComplexityAnalyzer, ComplexityReport, Strategy};

pub mod core;
pub use crate::core::{Arg, CadHandle, DirectCall, FeatureDescriptor, HandleFactory, RouterBuilder};

pub mod error;
pub use error::{ErrorContext, ErrorKind, Result, RouterError};

pub mod operation;
pub use operation::{OperationFamily, OperationRequest, ParamValue};

pub mod pool;
pub use pool::{HandlePool, PoolConfig};

pub mod resilience;
pub use resilience::{BreakerScope, CircuitBreaker, CircuitState, Resilience, RetryExecutor};

pub mod script;
pub use script::{GeneratedScript, ScriptGenerator, ScriptStore};

pub mod router;
pub use router::{Command, FallbackCommand, HandleSource, HealthReport, Routed, RoutingOrchestrator};

pub mod config;
pub use config::{ConfigProvider, RouterConfig};

pub mod logging;
pub use logging::{init_logging, LoggingConfig};

// Utility module for common functionality
mod util;

#[cfg(test)]
mod tests;

/// Create a new orchestrator builder
pub fn router() -> RouterBuilder {
    RouterBuilder::new()
}
