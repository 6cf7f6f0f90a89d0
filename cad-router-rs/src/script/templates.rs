//! Per-family VBA templates
//!
//! Each template fills a [`ScriptBody`] with variable declarations, sketch
//! selections and the feature-creation call in the positional order of the
//! application's scripting entry point. Values are normalized to meters and
//! radians here, and every literal is rendered through [`super::syntax`].

use std::collections::BTreeMap;

use super::syntax::{boolean, is_identifier_path, literal, number, quote};
use super::units::{deg_to_rad, mm_to_m};
use crate::error::{Result, RouterError};
use crate::operation::{OperationFamily, OperationRequest, ParamValue};

const INDENT: &str = "    ";

/// Selection marks understood by the feature manager
const MARK_PROFILE: i64 = 1;
const MARK_GUIDE: i64 = 2;
const MARK_PATH: i64 = 4;
const MARK_AXIS: i64 = 16;

/// Twist control options for swept features
const TWIST_FOLLOW_PATH: i64 = 0;
const TWIST_CONSTANT: i64 = 3;

/// Statement lines of the generated procedure plus the values substituted into them
#[derive(Debug, Default)]
pub(super) struct ScriptBody {
    lines: Vec<String>,
    parameters: BTreeMap<String, String>,
    /// Label used when the call creates no feature; `None` skips the check
    feature_label: Option<String>,
}

impl ScriptBody {
    fn line(&mut self, statement: impl AsRef<str>) {
        self.lines.push(format!("{}{}", INDENT, statement.as_ref()));
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    fn comment(&mut self, text: &str) {
        self.line(format!("' {}", text));
    }

    fn dim(&mut self, name: &str, vb_type: &str, value: String) {
        self.line(format!("Dim {} As {}", name, vb_type));
        self.line(format!("{} = {}", name, value));
        self.parameters.insert(name.to_string(), value);
    }

    fn double(&mut self, name: &str, value: f64) -> Result<()> {
        self.dim(name, "Double", number(value)?);
        Ok(())
    }

    fn flag(&mut self, name: &str, value: bool) {
        self.dim(name, "Boolean", boolean(value).to_string());
    }

    fn long(&mut self, name: &str, value: i64) {
        self.dim(name, "Long", value.to_string());
    }

    fn select(&mut self, key: &str, entity: &str, kind: &str, append: bool, mark: i64) {
        let name = quote(entity);
        self.line(format!(
            "boolStatus = swModel.Extension.SelectByID2({}, {}, 0, 0, 0, {}, {}, Nothing, 0)",
            name,
            quote(kind),
            boolean(append),
            mark
        ));
        self.parameters.insert(key.to_string(), name);
    }

    fn create(&mut self, method: &str, args: &[&str], label: &str) {
        self.line(format!("Set swFeat = swFeatMgr.{}({})", method, args.join(", ")));
        self.feature_label = Some(label.to_string());
    }

    pub(super) fn into_parts(self) -> (Vec<String>, BTreeMap<String, String>, Option<String>) {
        (self.lines, self.parameters, self.feature_label)
    }
}

fn required(request: &OperationRequest, key: &str) -> Result<f64> {
    request.number(key).ok_or_else(|| {
        RouterError::script_generation(format!(
            "{} requires numeric parameter '{}'",
            request.operation(),
            key
        ))
    })
}

fn required_text<'a>(request: &'a OperationRequest, key: &str) -> Result<&'a str> {
    request.text(key).ok_or_else(|| {
        RouterError::script_generation(format!(
            "{} requires sketch name '{}'",
            request.operation(),
            key
        ))
    })
}

/// Body for a known family
pub(super) fn family_body(family: OperationFamily, request: &OperationRequest) -> Result<ScriptBody> {
    match family {
        OperationFamily::Extrude => extrude(request, false),
        OperationFamily::CutExtrude => extrude(request, true),
        OperationFamily::Revolve => revolve(request),
        OperationFamily::Sweep => sweep(request),
        OperationFamily::Loft => loft(request),
    }
}

/// Merge into the existing body unless the request says otherwise
fn merge_result(request: &OperationRequest) -> bool {
    request.get("merge").and_then(ParamValue::as_bool).unwrap_or(true)
}

fn select_sketch(body: &mut ScriptBody, request: &OperationRequest) {
    if let Some(sketch) = request.text("sketch") {
        body.line("swModel.ClearSelection2 True");
        body.select("sketch", sketch, "SKETCH", false, 0);
        body.blank();
    }
}

/// Thin-wall declarations, emitted only when the feature is enabled
fn thin_block(body: &mut ScriptBody, request: &OperationRequest, with_caps: bool) -> Result<()> {
    let thickness = required(request, "thinThickness")?;
    body.comment("Thin-wall feature");
    body.double("thinThickness", mm_to_m(thickness))?;
    body.flag("thinReverse", request.flag("thinReverse"));
    body.long("thinType", if request.flag("thinMidPlane") { 2 } else { 0 });
    if with_caps {
        let caps = request.flag("capEnds");
        body.flag("capEnds", caps);
        let cap_thickness = request.number("capThickness").unwrap_or(thickness);
        body.double("capThickness", if caps { mm_to_m(cap_thickness) } else { 0.0 })?;
    }
    body.blank();
    Ok(())
}

fn extrude(request: &OperationRequest, cut: bool) -> Result<ScriptBody> {
    let mut body = ScriptBody::default();
    let both = request.flag("bothDirections");
    let thin = request.flag("thinFeature");
    let draft = request.number("draft").unwrap_or(0.0);

    select_sketch(&mut body, request);

    body.comment("Direction 1");
    body.flag("singleDir", !both);
    body.flag("flipSide", request.flag("flipSide"));
    body.flag("reverseDir", request.flag("reverse"));
    body.long("endCond1", request.end_condition("endCondition").code());
    body.double("depth1", mm_to_m(required(request, "depth")?))?;
    body.flag("draftOn", draft != 0.0);
    body.flag("draftOutward", request.flag("draftOutward"));
    body.double("draftAngle", deg_to_rad(draft.abs()))?;
    body.blank();

    let (end2, depth2, draft2, outward2, angle2) = if both {
        body.comment("Direction 2");
        body.long("endCond2", request.end_condition("endCondition2").code());
        body.double("depth2", mm_to_m(required(request, "depth2")?))?;
        body.blank();
        ("endCond2", "depth2", "draftOn", "draftOutward", "draftAngle")
    } else {
        ("0", "0", "False", "False", "0")
    };

    body.flag("mergeResult", merge_result(request));

    if thin {
        thin_block(&mut body, request, !cut)?;
    }

    let mut args = vec![
        "singleDir", "flipSide", "reverseDir", "endCond1", end2, "depth1", depth2, "draftOn", draft2,
        "draftOutward", outward2, "draftAngle", angle2, "False", "False",
    ];

    let (method, label) = match (cut, thin) {
        (false, false) => {
            args.extend(["False", "False", "mergeResult", "True", "True", "0", "0", "False"]);
            ("FeatureExtrusion3", "Boss-Extrude")
        }
        (false, true) => {
            args.extend([
                "mergeResult", "True", "True", "0", "0", "False", "thinThickness", "0", "capThickness",
                "thinReverse", "capEnds", "False", "0", "thinType",
            ]);
            ("FeatureExtrusionThin2", "Boss-Extrude")
        }
        (true, false) => {
            args.extend([
                "False", "False", "False", "True", "True", "True", "True", "False", "0", "0", "False", "False",
            ]);
            ("FeatureCut4", "Cut-Extrude")
        }
        (true, true) => {
            args.extend([
                "False", "True", "True", "True", "True", "False", "0", "0", "False", "thinThickness", "0",
                "thinReverse", "thinType",
            ]);
            ("FeatureCutThin2", "Cut-Extrude")
        }
    };

    body.create(method, &args, label);
    Ok(body)
}

fn revolve(request: &OperationRequest) -> Result<ScriptBody> {
    let mut body = ScriptBody::default();
    let both = request.flag("bothDirections");
    let thin = request.flag("thinFeature");

    select_sketch(&mut body, request);
    if let Some(axis) = request.text("axis") {
        body.select("axis", axis, "AXIS", true, MARK_AXIS);
        body.blank();
    }

    body.comment("Revolution");
    body.flag("singleDir", !both);
    body.flag("isCut", request.flag("cut"));
    body.flag("reverseDir", request.flag("reverse"));
    body.double("angle1", deg_to_rad(required(request, "angle")?))?;
    let angle2 = if both {
        body.double("angle2", deg_to_rad(required(request, "angle2")?))?;
        "angle2"
    } else {
        "0"
    };
    body.flag("mergeResult", merge_result(request));
    body.blank();

    let (thickness, thin_type) = if thin {
        thin_block(&mut body, request, false)?;
        ("thinThickness", "thinType")
    } else {
        ("0", "0")
    };

    let args = [
        "singleDir", "True", boolean(thin), "isCut", "reverseDir", "False", "0", "0", "angle1", angle2,
        "False", "False", "0", "0", thin_type, thickness, "0", "mergeResult", "True", "True",
    ];
    body.create("FeatureRevolve2", &args, "Revolve");
    Ok(body)
}

fn select_guides(body: &mut ScriptBody, request: &OperationRequest) {
    for (i, guide) in request.text_list("guideCurves").into_iter().enumerate() {
        body.select(&format!("guide{}", i + 1), guide, "SKETCH", true, MARK_GUIDE);
    }
}

fn sweep(request: &OperationRequest) -> Result<ScriptBody> {
    let mut body = ScriptBody::default();
    let thin = request.flag("thinFeature");
    let twist = request.number("twistAngle").unwrap_or(0.0);

    body.line("swModel.ClearSelection2 True");
    body.select("profile", required_text(request, "profile")?, "SKETCH", false, MARK_PROFILE);
    body.select("path", required_text(request, "path")?, "SKETCH", true, MARK_PATH);
    select_guides(&mut body, request);
    body.blank();

    body.comment("Sweep");
    body.long("twistControl", if twist != 0.0 { TWIST_CONSTANT } else { TWIST_FOLLOW_PATH });
    body.double("twistAngle", deg_to_rad(twist))?;
    body.flag("keepTangency", request.flag("keepTangency"));
    body.flag("mergeResult", merge_result(request));
    body.blank();

    let (thickness, thin_type) = if thin {
        thin_block(&mut body, request, false)?;
        ("thinThickness", "thinType")
    } else {
        ("0", "0")
    };

    let args = [
        "False", "0", "twistControl", "keepTangency", "False", "0", "0", boolean(thin), thickness, "0",
        thin_type, "0", "mergeResult", "True", "True", "twistAngle", "True",
    ];
    body.create("InsertProtrusionSwept4", &args, "Sweep");
    Ok(body)
}

fn loft(request: &OperationRequest) -> Result<ScriptBody> {
    let mut body = ScriptBody::default();
    let thin = request.flag("thinFeature");
    let profiles = request.text_list("profiles");
    if profiles.len() < 2 {
        return Err(RouterError::script_generation(
            "loft requires at least two profile sketches",
        ));
    }

    body.line("swModel.ClearSelection2 True");
    for (i, profile) in profiles.iter().enumerate() {
        body.select(&format!("profile{}", i + 1), profile, "SKETCH", i > 0, MARK_PROFILE);
    }
    select_guides(&mut body, request);
    body.blank();

    body.comment("Loft");
    body.flag("closedLoft", request.flag("closed"));
    body.long("startMatch", if request.flag("startTangent") { 1 } else { 0 });
    body.long("endMatch", if request.flag("endTangent") { 1 } else { 0 });
    body.flag("mergeResult", merge_result(request));
    body.blank();

    let (thickness, thin_type) = if thin {
        thin_block(&mut body, request, false)?;
        ("thinThickness", "thinType")
    } else {
        ("0", "0")
    };

    let args = [
        "closedLoft", "False", "False", "1", "startMatch", "endMatch", "1", "1", "False", "False",
        boolean(thin), thickness, "0", thin_type, "mergeResult", "True", "True", "0",
    ];
    body.create("InsertProtrusionBlend2", &args, "Loft");
    Ok(body)
}

/// Body for an arbitrary model method called with positional arguments
pub(super) fn generic_body(method: &str, args: &[ParamValue]) -> Result<ScriptBody> {
    if !is_identifier_path(method) {
        return Err(RouterError::validation(format!(
            "'{}' is not a valid method name",
            method
        )));
    }

    let mut body = ScriptBody::default();
    let mut rendered = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let value = literal(arg)?;
        body.parameters.insert(format!("arg{}", i + 1), value.clone());
        rendered.push(value);
    }

    if rendered.is_empty() {
        body.line(format!("swModel.{}", method));
    } else {
        body.line(format!("swModel.{} {}", method, rendered.join(", ")));
    }
    Ok(body)
}
