//! Mapping of requests onto native calls
//!
//! Each family fills one argument per call slot, so the arity of the built
//! call equals the effective count computed by the analyzer. Values are
//! converted to meters and radians.

use crate::core::{Arg, DirectCall};
use crate::error::{Result, RouterError};
use crate::operation::{OperationFamily, OperationRequest, ParamValue};
use crate::script::is_identifier_path;
use crate::script::units::{deg_to_rad, mm_to_m};

fn length(request: &OperationRequest, key: &str) -> Arg {
    Arg::Double(mm_to_m(request.number(key).unwrap_or(0.0)))
}

fn angle(request: &OperationRequest, key: &str) -> Arg {
    Arg::Double(deg_to_rad(request.number(key).unwrap_or(0.0).abs()))
}

fn flag(request: &OperationRequest, key: &str) -> Arg {
    Arg::Bool(request.flag(key))
}

fn merge(request: &OperationRequest) -> Arg {
    Arg::Bool(request.get("merge").and_then(ParamValue::as_bool).unwrap_or(true))
}

fn text(request: &OperationRequest, key: &str) -> Arg {
    request.text(key).map_or(Arg::Empty, |s| Arg::Text(s.to_string()))
}

fn joined(request: &OperationRequest, key: &str) -> Arg {
    let items = request.text_list(key);
    if items.is_empty() {
        Arg::Empty
    } else {
        Arg::Text(items.join(","))
    }
}

fn thin_type(request: &OperationRequest) -> Arg {
    Arg::Int(if request.flag("thinMidPlane") { 2 } else { 0 })
}

fn extrude_args(request: &OperationRequest, cut: bool) -> Vec<Arg> {
    let mut args = vec![
        Arg::Bool(!request.flag("bothDirections")),
        flag(request, "reverse"),
        Arg::Int(request.end_condition("endCondition").code()),
        length(request, "depth"),
        merge(request),
        text(request, "sketch"),
    ];
    if cut {
        args.push(flag(request, "flipSide"));
    }
    if request.flag("bothDirections") {
        args.push(Arg::Int(request.end_condition("endCondition2").code()));
        args.push(length(request, "depth2"));
    }
    if request.number("draft").is_some_and(|d| d != 0.0) {
        args.push(angle(request, "draft"));
        args.push(flag(request, "draftOutward"));
    }
    if request.flag("thinFeature") {
        args.push(length(request, "thinThickness"));
        args.push(Arg::Double(0.0));
        args.push(flag(request, "thinReverse"));
        args.push(thin_type(request));
    }
    if !cut && request.flag("capEnds") {
        args.push(Arg::Bool(true));
        let cap = request.number("capThickness").or_else(|| request.number("thinThickness"));
        args.push(Arg::Double(mm_to_m(cap.unwrap_or(0.0))));
    }
    args
}

fn revolve_args(request: &OperationRequest) -> Vec<Arg> {
    let mut args = vec![
        Arg::Bool(!request.flag("bothDirections")),
        angle(request, "angle"),
        flag(request, "reverse"),
        flag(request, "cut"),
        text(request, "axis"),
    ];
    if request.flag("bothDirections") {
        args.push(angle(request, "angle2"));
        args.push(Arg::Int(0));
    }
    if request.flag("thinFeature") {
        args.push(length(request, "thinThickness"));
        args.push(flag(request, "thinReverse"));
        args.push(thin_type(request));
    }
    args
}

fn loft_args(request: &OperationRequest) -> Vec<Arg> {
    let mut args = vec![
        joined(request, "profiles"),
        flag(request, "keepTangency"),
        Arg::Bool(false),
        Arg::Double(1.0),
        Arg::Int(if request.flag("startTangent") { 1 } else { 0 }),
        Arg::Int(if request.flag("endTangent") { 1 } else { 0 }),
        merge(request),
        flag(request, "thinFeature"),
    ];
    if !request.text_list("guideCurves").is_empty() {
        args.push(joined(request, "guideCurves"));
        args.push(Arg::Int(0));
    }
    if request.flag("thinFeature") {
        args.push(length(request, "thinThickness"));
        args.push(Arg::Double(0.0));
        args.push(thin_type(request));
        args.push(flag(request, "thinReverse"));
    }
    if request.flag("startTangent") {
        args.push(Arg::Double(1.0));
    }
    if request.flag("endTangent") {
        args.push(Arg::Double(1.0));
    }
    if request.flag("closed") {
        args.push(Arg::Bool(true));
    }
    args
}

fn sweep_args(request: &OperationRequest) -> Vec<Arg> {
    let mut args = vec![
        text(request, "profile"),
        text(request, "path"),
        Arg::Int(0),
        Arg::Int(0),
        flag(request, "keepTangency"),
        Arg::Bool(false),
        Arg::Int(0),
        Arg::Int(0),
        Arg::Int(0),
        merge(request),
        Arg::Bool(true),
        Arg::Bool(true),
        Arg::Bool(true),
        flag(request, "thinFeature"),
    ];
    if !request.text_list("guideCurves").is_empty() {
        args.push(joined(request, "guideCurves"));
        args.push(Arg::Int(0));
    }
    if request.flag("thinFeature") {
        args.push(length(request, "thinThickness"));
        args.push(Arg::Double(0.0));
        args.push(thin_type(request));
        args.push(flag(request, "thinReverse"));
    }
    if request.number("twistAngle").is_some_and(|t| t != 0.0) {
        args.push(Arg::Double(deg_to_rad(request.number("twistAngle").unwrap_or(0.0))));
        args.push(Arg::Int(3));
    }
    args
}

/// Native method called for each family
pub fn method_for(family: OperationFamily) -> &'static str {
    match family {
        OperationFamily::Extrude => "FeatureExtrusion",
        OperationFamily::CutExtrude => "FeatureCut",
        OperationFamily::Revolve => "FeatureRevolve",
        OperationFamily::Sweep => "InsertProtrusionSwept",
        OperationFamily::Loft => "InsertProtrusionBlend",
    }
}

fn passthrough(key: &str, value: &ParamValue) -> Result<Arg> {
    Ok(match value {
        ParamValue::Null => Arg::Empty,
        ParamValue::Bool(b) => Arg::Bool(*b),
        ParamValue::Integer(i) => Arg::Int(*i),
        ParamValue::Number(n) => Arg::Double(*n),
        ParamValue::Text(s) => Arg::Text(s.clone()),
        ParamValue::List(_) => {
            return Err(RouterError::validation(format!(
                "Parameter '{}' is a list and cannot be passed to a direct call",
                key
            )))
        }
    })
}

/// Build the native call for a request.
///
/// Unknown operations call the method of the same name with their parameter
/// values untouched, positioned by parameter name in ascending order
/// (`{"radius", "count"}` passes `count` first). Callers that need a specific
/// positional order should choose names that sort that way, e.g. `arg01`,
/// `arg02`. Calls wider than `max_args` are refused before reaching the
/// application.
pub fn build_direct_call(request: &OperationRequest, max_args: usize) -> Result<DirectCall> {
    let call = match request.family() {
        Some(family) => {
            let args = match family {
                OperationFamily::Extrude => extrude_args(request, false),
                OperationFamily::CutExtrude => extrude_args(request, true),
                OperationFamily::Revolve => revolve_args(request),
                OperationFamily::Loft => loft_args(request),
                OperationFamily::Sweep => sweep_args(request),
            };
            DirectCall::new(method_for(family), args)
        }
        None => {
            let method = request.operation();
            if !is_identifier_path(method) {
                return Err(RouterError::validation(format!(
                    "'{}' is not a valid method name",
                    method
                )));
            }
            let args = request
                .parameters()
                .iter()
                .map(|(key, value)| passthrough(key, value))
                .collect::<Result<Vec<_>>>()?;
            DirectCall::new(method, args)
        }
    };

    if call.arity() > max_args {
        return Err(RouterError::external_call(format!(
            "{} needs {} arguments, the direct call limit is {}",
            call.method,
            call.arity(),
            max_args
        )));
    }
    Ok(call)
}
