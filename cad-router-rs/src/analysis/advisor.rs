//! Simplification advisor for script-bound requests.
//!
//! Proposes parameter reductions that would bring a request back under the
//! direct-call thresholds. Advice only; requests are never rewritten.

use serde::Serialize;

use super::{always_script, ComplexityAnalyzer, ComplexityReport, Strategy};

/// One proposed reduction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Simplification {
    /// Parameter key the advice is about
    pub feature: &'static str,
    /// Human-readable suggestion
    pub suggestion: &'static str,
    /// Call slots removed if the suggestion is followed
    pub slots_saved: u32,
}

/// Suggestions plus where following all of them would land the request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimplificationPlan {
    pub suggestions: Vec<Simplification>,
    pub projected_count: u32,
    pub projected_strategy: Strategy,
}

fn suggestion_for(feature: &str) -> Option<&'static str> {
    let text = match feature {
        "bothDirections" => "Split the bidirectional extrusion into two single-direction operations",
        "draft" => "Create the body without draft and add a separate draft feature afterwards",
        "thinFeature" => "Create a solid body and apply a shell feature instead of a thin-wall feature",
        "capEnds" => "Leave the thin feature open and close the ends with a separate feature",
        "guideCurves" => "Replace guide curves with additional intermediate profiles",
        "twistAngle" => "Drive the twist with a helical path instead of a twist angle",
        "startTangent" => "Drop the start tangency constraint",
        "endTangent" => "Drop the end tangency constraint",
        "closed" => "Create an open loft and close it with a second loft",
        _ => return None,
    };
    Some(text)
}

/// Build a simplification plan for a report.
///
/// Returns `None` unless the report routes to `script`. Largest savings come first.
pub fn advise(analyzer: &ComplexityAnalyzer, report: &ComplexityReport) -> Option<SimplificationPlan> {
    if report.strategy != Strategy::Script {
        return None;
    }

    let mut suggestions: Vec<Simplification> = report
        .features
        .iter()
        .filter_map(|f| {
            suggestion_for(f.feature).map(|suggestion| Simplification {
                feature: f.feature,
                suggestion,
                slots_saved: f.weight,
            })
        })
        .collect();
    suggestions.sort_by(|a, b| b.slots_saved.cmp(&a.slots_saved));

    let saved: u32 = suggestions.iter().map(|s| s.slots_saved).sum();
    let projected_count = report.effective_count.saturating_sub(saved);
    let projected_strategy = match report.family {
        Some(family) if always_script(family) => Strategy::Script,
        _ => analyzer.strategy_for_count(projected_count),
    };

    Some(SimplificationPlan {
        suggestions,
        projected_count,
        projected_strategy,
    })
}
