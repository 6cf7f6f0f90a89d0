//! VBA literal rendering
//!
//! Every value that ends up in script text goes through this module, so
//! caller-supplied strings can never break out of their literal.

use once_cell::sync::Lazy;
use regex::Regex;

use super::units::positive_zero;
use crate::error::{Result, RouterError};
use crate::operation::ParamValue;

static IDENTIFIER_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid identifier regex")
});

/// Whether `name` is a plain or dotted identifier (`FeatureFillet3`, `Extension.SelectByID2`)
pub fn is_identifier_path(name: &str) -> bool {
    IDENTIFIER_PATH.is_match(name)
}

/// Quote a string literal. `"` is doubled and control characters are spliced
/// in with `Chr(n)`.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\"\""),
            c if c.is_control() => {
                out.push_str(&format!("\" & Chr({}) & \"", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn boolean(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Render a double. Fails on NaN and infinities, which VBA cannot express.
pub fn number(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(RouterError::script_generation(format!(
            "cannot render non-finite number {}",
            value
        )));
    }
    Ok(positive_zero(value).to_string())
}

/// Render any parameter value
pub fn literal(value: &ParamValue) -> Result<String> {
    Ok(match value {
        ParamValue::Null => "Nothing".to_string(),
        ParamValue::Bool(b) => boolean(*b).to_string(),
        ParamValue::Integer(i) => i.to_string(),
        ParamValue::Number(n) => number(*n)?,
        ParamValue::Text(s) => quote(s),
        ParamValue::List(items) => {
            let rendered = items.iter().map(literal).collect::<Result<Vec<_>>>()?;
            format!("Array({})", rendered.join(", "))
        }
    })
}
