//! Core abstractions for the CAD router
//!
//! This module provides the capability interfaces the router drives:
//!
//! - `CadHandle`: one open session with an instance of the CAD application
//! - `HandleFactory`: creates handles on behalf of the pool
//! - `DirectCall` / `Arg`: the typed shape of a native call
//! - `FeatureDescriptor`: what a successful operation yields
//! - `RouterBuilder`: builder pattern for the orchestrator
//!
//! The application's automation surface is dynamically typed: a name can be a
//! property or a method. Handles expose only the typed methods below, so that
//! ambiguity is resolved once, inside each `CadHandle` implementation.

pub mod builder;
pub use builder::RouterBuilder;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A primitive argument of a direct call, already in native units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    /// The "no value" sentinel
    Empty,
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Double(d) => write!(f, "{}", d),
            Arg::Text(s) => write!(f, "{:?}", s),
            Arg::Empty => write!(f, "<empty>"),
        }
    }
}

/// A native call: method name plus ordered positional arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectCall {
    pub method: String,
    pub args: Vec<Arg>,
}

impl DirectCall {
    pub fn new(method: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Descriptor of a feature created by the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    /// Name shown in the feature tree, e.g. `Boss-Extrude1`
    pub name: String,
    /// Application type name, e.g. `Extrusion`
    pub kind: String,
}

impl FeatureDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// One session with the CAD application.
///
/// Implementations are single-threaded on the application side: the router
/// never issues two calls on the same handle concurrently. Calls cannot be
/// cancelled once dispatched; dropping the returned future only stops waiting.
#[async_trait]
pub trait CadHandle: Send + Sync {
    /// Stable identifier of this session
    fn id(&self) -> &str;

    /// Invoke a native method. `Ok(None)` is the application's null signal.
    async fn invoke(&self, call: &DirectCall) -> Result<Option<FeatureDescriptor>>;

    /// Run a script file by module and procedure name. Returns the success flag.
    async fn run_script(&self, path: &Path, module: &str, procedure: &str) -> Result<bool>;

    /// Query the most recently created feature
    async fn last_feature(&self) -> Result<Option<FeatureDescriptor>>;

    /// Close the session
    async fn disconnect(&self) -> Result<()>;
}

/// Creates handles for the pool
#[async_trait]
pub trait HandleFactory: Send + Sync {
    /// Open a new session; connection failures map to `RouterError::Connection`
    async fn create(&self) -> Result<std::sync::Arc<dyn CadHandle>>;
}
