//! Operation requests submitted by the calling layer
//!
//! An [`OperationRequest`] names an operation and carries its parameters as a
//! map of typed values. Parameter keys use the caller-facing camelCase names
//! (`depth`, `bothDirections`, `thinThickness`, ...) and linear/angular values
//! stay in user units (millimeters, degrees) until a call or script is built.

mod validate;

pub use validate::validate;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

/// Operation families with dedicated routing knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationFamily {
    Extrude,
    CutExtrude,
    Revolve,
    Sweep,
    Loft,
}

impl OperationFamily {
    /// Resolve an operation name to a known family.
    ///
    /// Matching ignores case and separators, so `cut-extrude`, `cut_extrude`
    /// and `CutExtrude` all resolve.
    pub fn from_operation(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "extrude" | "extrusion" | "bossextrude" => Some(Self::Extrude),
            "cutextrude" | "extrudecut" => Some(Self::CutExtrude),
            "revolve" | "revolution" => Some(Self::Revolve),
            "sweep" | "sweptboss" => Some(Self::Sweep),
            "loft" | "loftedboss" => Some(Self::Loft),
            _ => None,
        }
    }

    /// Canonical tag of the family
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extrude => "extrude",
            Self::CutExtrude => "cut-extrude",
            Self::Revolve => "revolve",
            Self::Sweep => "sweep",
            Self::Loft => "loft",
        }
    }

    /// All known families
    pub fn all() -> &'static [OperationFamily] {
        &[
            Self::Extrude,
            Self::CutExtrude,
            Self::Revolve,
            Self::Sweep,
            Self::Loft,
        ]
    }
}

impl fmt::Display for OperationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Numeric view of the value; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short type name used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Bool(_) => "boolean",
            ParamValue::Integer(_) => "integer",
            ParamValue::Number(_) => "number",
            ParamValue::Text(_) => "string",
            ParamValue::List(_) => "list",
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(value as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Extrusion end conditions with their application enum codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndCondition {
    #[default]
    Blind,
    ThroughAll,
    ThroughNext,
    MidPlane,
}

impl EndCondition {
    /// Parse `blind`, `through-all`, `through_next`, `midPlane`, ...
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "blind" => Some(Self::Blind),
            "throughall" => Some(Self::ThroughAll),
            "throughnext" | "uptonext" => Some(Self::ThroughNext),
            "midplane" => Some(Self::MidPlane),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Blind => 0,
            Self::ThroughAll => 1,
            Self::ThroughNext => 2,
            Self::MidPlane => 6,
        }
    }
}

/// An operation submitted for routing. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    operation: String,
    #[serde(default)]
    parameters: BTreeMap<String, ParamValue>,
}

impl OperationRequest {
    /// Start a request for the named operation
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a parameter (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Parse a request from its JSON form
    /// (`{"operation": "extrude", "parameters": {"depth": 25}}`)
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RouterError::validation(format!("Malformed operation request: {}", e)))
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn family(&self) -> Option<OperationFamily> {
        OperationFamily::from_operation(&self.operation)
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key).filter(|v| **v != ParamValue::Null)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ParamValue::as_f64)
    }

    /// Boolean flag; absent flags are off
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(ParamValue::as_bool).unwrap_or(false)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::as_str)
    }

    /// End condition stored under `key`; absent means blind
    pub fn end_condition(&self, key: &str) -> EndCondition {
        self.text(key)
            .and_then(EndCondition::from_name)
            .unwrap_or_default()
    }

    /// Text entries of a list parameter; non-text entries are skipped
    pub fn text_list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .and_then(ParamValue::as_list)
            .map(|items| items.iter().filter_map(ParamValue::as_str).collect())
            .unwrap_or_default()
    }
}
