//! Error mapping for external application signals
//!
//! This module maps raw outcomes of the automation bridge to our normalized
//! RouterError type and classifies errors for the retry and breaker policies.

use super::{ErrorKind, RouterError};
use crate::util::truncate_string;

/// How the orchestrator may recover from an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryClass {
    /// Retried locally with the fixed backoff budget
    Transient,
    /// Recoverable only through the hybrid/explicit fallback path
    Fallback,
    /// Returned to the caller immediately
    Permanent,
}

/// Classify an error by how it may be recovered
pub fn classify(error: &RouterError) -> RecoveryClass {
    match error.kind() {
        ErrorKind::Connection => RecoveryClass::Transient,
        ErrorKind::ExternalCall | ErrorKind::Other => RecoveryClass::Fallback,
        ErrorKind::Validation
        | ErrorKind::CircuitOpen
        | ErrorKind::AcquisitionTimeout
        | ErrorKind::ScriptGeneration
        | ErrorKind::Configuration
        | ErrorKind::Io => RecoveryClass::Permanent,
    }
}

/// Whether an error returned by a protected call says the external resource misbehaved.
///
/// Caller-side errors leave the breaker state untouched.
pub fn counts_against_breaker(error: &RouterError) -> bool {
    matches!(
        error.kind(),
        ErrorKind::Connection | ErrorKind::ExternalCall | ErrorKind::Other
    )
}

/// Map the null/failure signal of a direct call to an ExternalCall error
pub fn map_null_signal<T>(method: &str, value: Option<T>) -> Result<T, RouterError> {
    value.ok_or_else(|| RouterError::external_call(format!("{} returned no result", method)))
}

/// Map the success flag of a script run to an ExternalCall error
pub fn map_script_signal(module: &str, procedure: &str, succeeded: bool) -> Result<(), RouterError> {
    if succeeded {
        Ok(())
    } else {
        Err(RouterError::external_call(format!(
            "script {}.{} reported failure",
            module, procedure
        )))
    }
}

/// Short single-line summary of an error for log fields
pub fn summarize(error: &RouterError) -> String {
    let message = error.to_string().replace(['\r', '\n'], " ");
    format!("[{}] {}", error.kind(), truncate_string(&message, 160))
}
