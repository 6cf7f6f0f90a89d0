//! Complexity analysis for routing decisions
//!
//! The automation bridge can only marshal a bounded number of positional
//! arguments per call. The analyzer computes the *effective* parameter count
//! of a request (the number of native call slots it occupies once every
//! enabled optional feature is accounted for) and maps it to a [`Strategy`].

mod advisor;

pub use advisor::{advise, Simplification, SimplificationPlan};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::{OperationFamily, OperationRequest};

/// Execution strategy for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Invoke the native call surface directly
    Direct,
    /// Attempt a direct call, fall back to a generated script on failure
    Hybrid,
    /// Generate and run a script inside the application
    Script,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Direct => write!(f, "direct"),
            Strategy::Hybrid => write!(f, "hybrid"),
            Strategy::Script => write!(f, "script"),
        }
    }
}

/// Thresholds and confidence defaults for the analyzer.
///
/// The confidences are illustrative defaults, not measured success rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Highest effective count routed directly
    pub direct_max_count: u32,

    /// Highest effective count routed as hybrid; anything above goes to script
    pub hybrid_max_count: u32,

    pub direct_confidence: f64,
    pub hybrid_confidence: f64,
    pub script_confidence: f64,

    /// Confidence reported for families without routing data
    pub unknown_confidence: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            direct_max_count: 8,
            hybrid_max_count: 12,
            direct_confidence: 0.99,
            hybrid_confidence: 0.85,
            script_confidence: 0.95,
            unknown_confidence: 0.5,
        }
    }
}

/// One optional feature that contributed to the effective count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureWeight {
    /// Parameter key that enabled the feature
    pub feature: &'static str,
    /// Native call slots the feature occupies
    pub weight: u32,
}

/// Routing decision for one request. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityReport {
    pub operation: String,
    pub family: Option<OperationFamily>,
    pub effective_count: u32,
    pub strategy: Strategy,
    pub confidence: f64,
    pub reason: Option<String>,
    pub features: Vec<FeatureWeight>,
}

/// Slots of the minimal call shape of each family
pub fn base_weight(family: OperationFamily) -> u32 {
    match family {
        OperationFamily::Extrude => 6,
        OperationFamily::CutExtrude => 7,
        OperationFamily::Revolve => 5,
        OperationFamily::Loft => 8,
        OperationFamily::Sweep => 14,
    }
}

/// Families whose minimal call shape already exceeds the bridge limit
pub fn always_script(family: OperationFamily) -> bool {
    matches!(family, OperationFamily::Sweep)
}

fn has_list(request: &OperationRequest, key: &str) -> bool {
    request
        .get(key)
        .and_then(|v| v.as_list())
        .is_some_and(|items| !items.is_empty())
}

fn non_zero(request: &OperationRequest, key: &str) -> bool {
    request.number(key).is_some_and(|v| v != 0.0)
}

/// Enabled optional features of a request with their slot weights, in slot order
pub fn feature_weights(family: OperationFamily, request: &OperationRequest) -> Vec<FeatureWeight> {
    let candidates: Vec<(&'static str, u32, bool)> = match family {
        OperationFamily::Extrude => vec![
            ("bothDirections", 2, request.flag("bothDirections")),
            ("draft", 2, non_zero(request, "draft")),
            ("thinFeature", 4, request.flag("thinFeature")),
            ("capEnds", 2, request.flag("capEnds")),
        ],
        OperationFamily::CutExtrude => vec![
            ("bothDirections", 2, request.flag("bothDirections")),
            ("draft", 2, non_zero(request, "draft")),
            ("thinFeature", 4, request.flag("thinFeature")),
        ],
        OperationFamily::Revolve => vec![
            ("bothDirections", 2, request.flag("bothDirections")),
            ("thinFeature", 3, request.flag("thinFeature")),
        ],
        OperationFamily::Loft => vec![
            ("guideCurves", 2, has_list(request, "guideCurves")),
            ("thinFeature", 4, request.flag("thinFeature")),
            ("startTangent", 1, request.flag("startTangent")),
            ("endTangent", 1, request.flag("endTangent")),
            ("closed", 1, request.flag("closed")),
        ],
        OperationFamily::Sweep => vec![
            ("guideCurves", 2, has_list(request, "guideCurves")),
            ("thinFeature", 4, request.flag("thinFeature")),
            ("twistAngle", 2, non_zero(request, "twistAngle")),
        ],
    };

    candidates
        .into_iter()
        .filter(|(_, _, enabled)| *enabled)
        .map(|(feature, weight, _)| FeatureWeight { feature, weight })
        .collect()
}

/// Pure mapping from requests to routing decisions
#[derive(Debug, Clone, Default)]
pub struct ComplexityAnalyzer {
    config: AnalyzerConfig,
}

impl ComplexityAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Strategy for an effective count under the configured thresholds
    pub fn strategy_for_count(&self, count: u32) -> Strategy {
        if count <= self.config.direct_max_count {
            Strategy::Direct
        } else if count <= self.config.hybrid_max_count {
            Strategy::Hybrid
        } else {
            Strategy::Script
        }
    }

    fn confidence_for(&self, strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Direct => self.config.direct_confidence,
            Strategy::Hybrid => self.config.hybrid_confidence,
            Strategy::Script => self.config.script_confidence,
        }
    }

    /// Analyze a request. Never fails.
    pub fn analyze(&self, request: &OperationRequest) -> ComplexityReport {
        let Some(family) = request.family() else {
            return ComplexityReport {
                operation: request.operation().to_string(),
                family: None,
                effective_count: request.parameters().len() as u32,
                strategy: Strategy::Direct,
                confidence: self.config.unknown_confidence,
                reason: Some(format!(
                    "No routing data for operation '{}', defaulting to direct",
                    request.operation()
                )),
                features: Vec::new(),
            };
        };

        let features = feature_weights(family, request);
        let effective_count = base_weight(family) + features.iter().map(|f| f.weight).sum::<u32>();

        let (strategy, reason) = if always_script(family) {
            (
                Strategy::Script,
                format!("{} always exceeds the direct call limit", family),
            )
        } else {
            let strategy = self.strategy_for_count(effective_count);
            let reason = match strategy {
                Strategy::Direct => format!(
                    "{} slots fit the direct call limit of {}",
                    effective_count, self.config.direct_max_count
                ),
                Strategy::Hybrid => format!(
                    "{} slots are near the marshaling limit, script fallback armed",
                    effective_count
                ),
                Strategy::Script => format!(
                    "{} slots exceed the marshaling limit of {}",
                    effective_count, self.config.hybrid_max_count
                ),
            };
            (strategy, reason)
        };

        ComplexityReport {
            operation: request.operation().to_string(),
            family: Some(family),
            effective_count,
            strategy,
            confidence: self.confidence_for(strategy),
            reason: Some(reason),
            features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> ComplexityAnalyzer {
        ComplexityAnalyzer::default()
    }

    #[test]
    fn test_plain_extrude_is_direct() {
        let report = analyzer().analyze(&OperationRequest::new("extrude").with("depth", 25.0));
        assert_eq!(report.effective_count, 6);
        assert_eq!(report.strategy, Strategy::Direct);
        assert_eq!(report.confidence, 0.99);
    }

    #[test]
    fn test_fully_featured_extrude_is_script() {
        let request = OperationRequest::new("extrude")
            .with("depth", 50.0)
            .with("bothDirections", true)
            .with("depth2", 30.0)
            .with("draft", 5.0)
            .with("thinFeature", true)
            .with("thinThickness", 2.0)
            .with("capEnds", true);

        let report = analyzer().analyze(&request);
        assert_eq!(report.effective_count, 16);
        assert_eq!(report.strategy, Strategy::Script);
        assert_eq!(report.confidence, 0.95);
    }

    #[test]
    fn test_hybrid_band() {
        // 6 + 2 + 2 = 10
        let request = OperationRequest::new("extrude")
            .with("depth", 20.0)
            .with("bothDirections", true)
            .with("depth2", 5.0)
            .with("draft", 3.0);
        let report = analyzer().analyze(&request);
        assert_eq!(report.effective_count, 10);
        assert_eq!(report.strategy, Strategy::Hybrid);
        assert_eq!(report.confidence, 0.85);
    }

    #[test]
    fn test_zero_draft_adds_nothing() {
        let request = OperationRequest::new("extrude").with("depth", 20.0).with("draft", 0.0);
        assert_eq!(analyzer().analyze(&request).effective_count, 6);
    }

    #[test]
    fn test_low_counts_always_direct() {
        let analyzer = analyzer();
        for count in 0..=8 {
            assert_eq!(analyzer.strategy_for_count(count), Strategy::Direct);
        }
        for count in 9..=12 {
            assert_eq!(analyzer.strategy_for_count(count), Strategy::Hybrid);
        }
        assert_eq!(analyzer.strategy_for_count(13), Strategy::Script);
    }

    #[test]
    fn test_sweep_is_always_script() {
        let analyzer = ComplexityAnalyzer::new(AnalyzerConfig {
            direct_max_count: 100,
            hybrid_max_count: 200,
            ..AnalyzerConfig::default()
        });
        let request = OperationRequest::new("sweep")
            .with("profile", "Sketch1")
            .with("path", "Sketch2");
        let report = analyzer.analyze(&request);
        assert_eq!(report.strategy, Strategy::Script);
    }

    #[test]
    fn test_unknown_family_defaults_to_direct() {
        let report = analyzer().analyze(&OperationRequest::new("shell").with("thickness", 1.0));
        assert_eq!(report.strategy, Strategy::Direct);
        assert_eq!(report.confidence, 0.5);
        assert!(report.family.is_none());
        assert!(report.reason.unwrap().contains("No routing data"));
    }

    #[test]
    fn test_loft_feature_weights() {
        let request = OperationRequest::new("loft")
            .with("profiles", vec!["Sketch1", "Sketch2", "Sketch3"])
            .with("guideCurves", vec!["Sketch4"])
            .with("closed", true);
        let report = analyzer().analyze(&request);
        assert_eq!(report.effective_count, 11);
        assert_eq!(report.strategy, Strategy::Hybrid);
        let names: Vec<_> = report.features.iter().map(|f| f.feature).collect();
        assert_eq!(names, vec!["guideCurves", "closed"]);
    }
}
