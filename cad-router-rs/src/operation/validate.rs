//! Request validation, run before anything reaches the external application

use super::{EndCondition, OperationFamily, OperationRequest, ParamValue};
use crate::error::{Result, RouterError};

/// Validate a request against the rules of its family.
///
/// Unknown families only get the structural checks (finite numbers, known
/// value shapes); their parameters are passed through untouched.
pub fn validate(request: &OperationRequest) -> Result<()> {
    if request.operation().trim().is_empty() {
        return Err(RouterError::validation("Operation name is empty"));
    }

    for (key, value) in request.parameters() {
        check_finite(key, value)?;
    }

    match request.family() {
        Some(OperationFamily::Extrude) | Some(OperationFamily::CutExtrude) => validate_extrude(request),
        Some(OperationFamily::Revolve) => validate_revolve(request),
        Some(OperationFamily::Sweep) => validate_sweep(request),
        Some(OperationFamily::Loft) => validate_loft(request),
        None => Ok(()),
    }
}

fn check_finite(key: &str, value: &ParamValue) -> Result<()> {
    match value {
        ParamValue::Number(n) if !n.is_finite() => Err(RouterError::validation(format!(
            "Parameter '{}' must be a finite number",
            key
        ))),
        ParamValue::List(items) => items.iter().try_for_each(|item| check_finite(key, item)),
        _ => Ok(()),
    }
}

fn expect_type(request: &OperationRequest, key: &str, expected: &str) -> Result<()> {
    let Some(value) = request.get(key) else {
        return Ok(());
    };
    let matches = match expected {
        "number" => value.as_f64().is_some(),
        "boolean" => value.as_bool().is_some(),
        "string" => value.as_str().is_some(),
        "list" => value.as_list().is_some(),
        _ => true,
    };
    if matches {
        Ok(())
    } else {
        Err(RouterError::validation(format!(
            "Parameter '{}' must be a {}, got {}",
            key,
            expected,
            value.type_name()
        )))
    }
}

fn require_positive(request: &OperationRequest, key: &str) -> Result<f64> {
    expect_type(request, key, "number")?;
    match request.number(key) {
        Some(v) if v > 0.0 => Ok(v),
        Some(v) => Err(RouterError::validation(format!(
            "Parameter '{}' must be greater than zero, got {}",
            key, v
        ))),
        None => Err(RouterError::validation(format!(
            "Missing required parameter '{}'",
            key
        ))),
    }
}

fn check_flags(request: &OperationRequest, keys: &[&str]) -> Result<()> {
    keys.iter().try_for_each(|key| expect_type(request, key, "boolean"))
}

fn check_thin(request: &OperationRequest) -> Result<()> {
    if request.flag("thinFeature") {
        require_positive(request, "thinThickness")?;
    }
    Ok(())
}

fn validate_extrude(request: &OperationRequest) -> Result<()> {
    check_flags(
        request,
        &["reverse", "bothDirections", "thinFeature", "capEnds", "merge", "draftOutward"],
    )?;
    require_positive(request, "depth")?;
    if request.flag("bothDirections") {
        require_positive(request, "depth2")?;
    }
    expect_type(request, "draft", "number")?;
    if let Some(draft) = request.number("draft") {
        if !(0.0..90.0).contains(&draft.abs()) {
            return Err(RouterError::validation(format!(
                "Draft angle must be below 90 degrees, got {}",
                draft
            )));
        }
    }
    check_thin(request)?;
    if request.flag("capEnds") && !request.flag("thinFeature") {
        return Err(RouterError::validation(
            "capEnds requires thinFeature to be enabled",
        ));
    }
    if request.flag("capEnds") {
        if let Some(cap) = request.number("capThickness") {
            if cap <= 0.0 {
                return Err(RouterError::validation("capThickness must be greater than zero"));
            }
        }
    }
    for key in ["endCondition", "endCondition2"] {
        expect_type(request, key, "string")?;
        if let Some(name) = request.text(key) {
            if EndCondition::from_name(name).is_none() {
                return Err(RouterError::validation(format!(
                    "Unknown end condition '{}' for '{}'",
                    name, key
                )));
            }
        }
    }
    Ok(())
}

fn validate_revolve(request: &OperationRequest) -> Result<()> {
    check_flags(request, &["reverse", "bothDirections", "thinFeature", "merge", "cut"])?;
    let angle = require_positive(request, "angle")?;
    if angle > 360.0 {
        return Err(RouterError::validation(format!(
            "Revolve angle must not exceed 360 degrees, got {}",
            angle
        )));
    }
    if request.flag("bothDirections") {
        require_positive(request, "angle2")?;
        let total = angle + request.number("angle2").unwrap_or(0.0);
        if total > 360.0 {
            return Err(RouterError::validation(format!(
                "Combined revolve angles must not exceed 360 degrees, got {}",
                total
            )));
        }
    }
    check_thin(request)
}

fn require_text(request: &OperationRequest, key: &str) -> Result<()> {
    expect_type(request, key, "string")?;
    match request.text(key) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(RouterError::validation(format!(
            "Missing required parameter '{}'",
            key
        ))),
    }
}

fn validate_sweep(request: &OperationRequest) -> Result<()> {
    check_flags(request, &["thinFeature", "merge", "keepTangency"])?;
    require_text(request, "profile")?;
    require_text(request, "path")?;
    expect_type(request, "guideCurves", "list")?;
    expect_type(request, "twistAngle", "number")?;
    check_thin(request)
}

fn validate_loft(request: &OperationRequest) -> Result<()> {
    check_flags(
        request,
        &["thinFeature", "merge", "closed", "startTangent", "endTangent"],
    )?;
    expect_type(request, "profiles", "list")?;
    let profiles = request.text_list("profiles");
    let listed = request.get("profiles").and_then(ParamValue::as_list).map_or(0, |l| l.len());
    if profiles.len() != listed {
        return Err(RouterError::validation("Loft profiles must all be sketch names"));
    }
    if profiles.len() < 2 {
        return Err(RouterError::validation(format!(
            "Loft requires at least two profiles, got {}",
            profiles.len()
        )));
    }
    expect_type(request, "guideCurves", "list")?;
    check_thin(request)
}
