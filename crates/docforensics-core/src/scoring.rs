/// Shared risk vocabulary: the risk ladder, finding severities and the
/// weighted-factor scoring used by similarity and corpus confidence.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete label over a continuous risk score in [0,1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Fixed threshold ladder
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 0.9 => RiskLevel::Critical,
            s if s >= 0.7 => RiskLevel::High,
            s if s >= 0.4 => RiskLevel::Medium,
            s if s >= 0.15 => RiskLevel::Low,
            _ => RiskLevel::Minimal,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskLevel::Critical => {
                "Block processing and escalate to the fraud investigation team immediately."
            }
            RiskLevel::High => "Hold for manual review by a senior analyst before proceeding.",
            RiskLevel::Medium => "Flag for follow-up review; proceed with caution.",
            RiskLevel::Low | RiskLevel::Minimal => "No action required.",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Minimal => "MINIMAL",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Severity of a detected finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_risk(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Minimal | RiskLevel::Low => Severity::Low,
            RiskLevel::Medium => Severity::Medium,
            RiskLevel::High => Severity::High,
            RiskLevel::Critical => Severity::Critical,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Severity::Critical => RiskLevel::Critical.recommendation(),
            Severity::High => RiskLevel::High.recommendation(),
            Severity::Medium => RiskLevel::Medium.recommendation(),
            Severity::Low => "Record for trend analysis; no immediate action required.",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// One named input to a weighted score
#[derive(Debug, Clone, Serialize)]
pub struct ScoreFactor {
    pub name: &'static str,
    pub score: f64,
    pub weight: f64,
}

impl ScoreFactor {
    pub fn new(name: &'static str, score: f64, weight: f64) -> Self {
        Self {
            name,
            score,
            weight,
        }
    }
}

/// Weighted average of factors, clamped to [0,1]
pub fn weighted_score(factors: &[ScoreFactor]) -> f64 {
    let total_weight: f64 = factors.iter().map(|f| f.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let total: f64 = factors.iter().map(|f| f.score * f.weight).sum();
    (total / total_weight).clamp(0.0, 1.0)
}

/// Confidence for a group-based finding
///
/// Grows with how far the group exceeds its minimum size and with the
/// strength of the underlying signal (already normalised to [0,1]).
pub fn group_confidence(group_size: usize, min_size: usize, signal_strength: f64) -> f64 {
    let excess = group_size.saturating_sub(min_size) as f64;
    let size_score = (0.6 + 0.1 * excess).min(1.0);
    let factors = [
        ScoreFactor::new("group_size", size_score, 0.5),
        ScoreFactor::new("signal_strength", signal_strength.clamp(0.0, 1.0), 0.5),
    ];
    weighted_score(&factors).min(0.99)
}

/// Round to four decimals so serialized scores stay stable
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
