/// Risk scoring for detected changes
use std::collections::BTreeMap;

use crate::config::DiffRules;
use crate::diff::{Change, ChangeCategory, ChangeType};
use crate::scoring::round4;
use crate::tree::DocumentNode;

/// Numeric facts about one change
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChangeMagnitude {
    /// Signed `(new - old) / |old| * 100`
    pub percent_delta: Option<f64>,
    /// Direction-free magnitude, `|new - old| / min(|old|, |new|) * 100`
    pub magnitude_pct: Option<f64>,
    pub round_number: bool,
}

impl ChangeMagnitude {
    pub fn measure(
        rules: &DiffRules,
        old: Option<&DocumentNode>,
        new: Option<&DocumentNode>,
    ) -> Self {
        let number = |node: Option<&DocumentNode>| {
            node.and_then(DocumentNode::as_scalar)
                .and_then(|scalar| scalar.as_number())
        };
        let (Some(old), Some(new)) = (number(old), number(new)) else {
            return Self::default();
        };
        if old == new {
            return Self::default();
        }

        let percent_delta = (old != 0.0).then(|| round4((new - old) / old.abs() * 100.0));

        let smaller = old.abs().min(new.abs());
        let magnitude_pct = if smaller > 0.0 {
            (new - old).abs() / smaller * 100.0
        } else {
            f64::INFINITY
        };

        let larger = old.abs().max(new.abs());
        let unit = rules.round_number_unit;
        let round_number = unit > 0.0 && larger >= unit && (larger % unit) == 0.0;

        Self {
            percent_delta,
            magnitude_pct: Some(magnitude_pct),
            round_number,
        }
    }

    fn exceeds_large(&self, rules: &DiffRules) -> bool {
        self.magnitude_pct.is_some_and(|m| m > rules.large_delta_pct)
    }

    fn exceeds_moderate(&self, rules: &DiffRules) -> bool {
        self.magnitude_pct.is_some_and(|m| m > rules.moderate_delta_pct)
    }
}

/// Risk of a single change in [0,1]
///
/// Category weight, scaled by the size of a numeric jump. The round-number
/// multiplier only applies on top of a jump past the moderate threshold.
pub fn score_change(rules: &DiffRules, category: ChangeCategory, magnitude: &ChangeMagnitude) -> f64 {
    let mut risk = rules.weights.weight(category);

    if magnitude.exceeds_large(rules) {
        risk *= rules.large_delta_multiplier;
    } else if magnitude.exceeds_moderate(rules) {
        risk *= rules.moderate_delta_multiplier;
    }

    if magnitude.round_number && magnitude.exceeds_moderate(rules) {
        risk *= rules.round_number_multiplier;
    }

    round4(risk.min(1.0))
}

/// Changes per category
pub fn category_counts(changes: &[Change]) -> BTreeMap<ChangeCategory, usize> {
    let mut counts = BTreeMap::new();
    for change in changes {
        *counts.entry(change.category).or_insert(0) += 1;
    }
    counts
}

/// Aggregate risk: worst change, boosted when edits cluster in one category
pub fn aggregate_risk(rules: &DiffRules, changes: &[Change]) -> f64 {
    let max = changes.iter().map(|c| c.risk_score).fold(0.0_f64, f64::max);
    if max == 0.0 {
        return 0.0;
    }
    let coordinated = category_counts(changes)
        .values()
        .any(|&n| n >= rules.coordinated_edit_count);
    let boosted = if coordinated {
        max + rules.coordinated_edit_boost
    } else {
        max
    };
    round4(boosted.min(1.0))
}

/// Human-readable findings from rule checks over the change set
pub fn suspicious_patterns(rules: &DiffRules, changes: &[Change]) -> Vec<String> {
    let mut patterns = Vec::new();

    let modified_in = |category: ChangeCategory| {
        changes
            .iter()
            .filter(|c| c.category == category && c.change_type == ChangeType::Modified)
            .count()
    };

    if modified_in(ChangeCategory::Financial) > 0 {
        patterns.push("Financial values modified".to_string());
    }

    let identity = modified_in(ChangeCategory::Identity);
    if identity > 0 {
        patterns.push(format!("Identity information modified ({} fields)", identity));
    }

    let signature = changes
        .iter()
        .filter(|c| c.category == ChangeCategory::Signature)
        .count();
    if signature > 0 {
        patterns.push(format!("Signature fields changed ({} fields)", signature));
    }

    for change in changes {
        let magnitude = change.magnitude_pct.unwrap_or(0.0);
        if magnitude > rules.large_delta_pct {
            match change.percent_delta {
                Some(pct) => patterns.push(format!(
                    "Large percentage change at {} ({:+.1}%)",
                    change.path, pct
                )),
                None => patterns.push(format!("Value changed from zero at {}", change.path)),
            }
        }
        if change.round_number && magnitude > rules.moderate_delta_pct {
            patterns.push(format!("Round-number value at {}", change.path));
        }
    }

    let sensitive_removed = changes
        .iter()
        .filter(|c| c.change_type == ChangeType::Removed && c.category.is_sensitive())
        .count();
    if sensitive_removed > 0 {
        patterns.push(format!("Sensitive fields removed ({} fields)", sensitive_removed));
    }

    for (category, count) in category_counts(changes) {
        if count >= rules.coordinated_edit_count && category != ChangeCategory::Other {
            patterns.push(format!(
                "Coordinated edits: {} {} fields changed",
                count, category
            ));
        }
    }

    let substantive = changes.iter().any(|c| c.category.is_sensitive());
    if substantive && changes.iter().any(|c| c.category == ChangeCategory::Metadata) {
        patterns.push("Metadata altered alongside substantive changes".to_string());
    }

    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Scalar;

    fn num(n: f64) -> DocumentNode {
        DocumentNode::Scalar(Scalar::Number(n))
    }

    #[test]
    fn test_percent_delta_and_symmetric_magnitude() {
        let rules = DiffRules::default();
        let forward = ChangeMagnitude::measure(&rules, Some(&num(100_000.0)), Some(&num(900_000.0)));
        let backward = ChangeMagnitude::measure(&rules, Some(&num(900_000.0)), Some(&num(100_000.0)));
        assert_eq!(forward.percent_delta, Some(800.0));
        assert!(backward.percent_delta.unwrap() < 0.0);
        assert_eq!(forward.magnitude_pct, backward.magnitude_pct);
        assert!(forward.round_number && backward.round_number);
    }

    #[test]
    fn test_zero_old_value_has_no_percent_delta() {
        let rules = DiffRules::default();
        let m = ChangeMagnitude::measure(&rules, Some(&num(0.0)), Some(&num(5.0)));
        assert_eq!(m.percent_delta, None);
        assert_eq!(m.magnitude_pct, Some(f64::INFINITY));
    }

    #[test]
    fn test_text_values_have_no_magnitude() {
        let rules = DiffRules::default();
        let a = DocumentNode::Scalar(Scalar::Text("Ada".into()));
        let b = DocumentNode::Scalar(Scalar::Text("Grace".into()));
        assert_eq!(ChangeMagnitude::measure(&rules, Some(&a), Some(&b)), ChangeMagnitude::default());
    }

    #[test]
    fn test_large_jump_triples_weight_and_caps() {
        let rules = DiffRules::default();
        let small = ChangeMagnitude::measure(&rules, Some(&num(1000.0)), Some(&num(1100.0)));
        let large = ChangeMagnitude::measure(&rules, Some(&num(1000.0)), Some(&num(1700.0)));
        assert_eq!(score_change(&rules, ChangeCategory::Other, &small), 0.2);
        assert!((score_change(&rules, ChangeCategory::Other, &large) - 0.6).abs() < 1e-9);
        assert_eq!(score_change(&rules, ChangeCategory::Financial, &large), 1.0);
    }

    #[test]
    fn test_round_number_only_counts_on_real_jumps() {
        let rules = DiffRules::default();
        let tiny_round = ChangeMagnitude::measure(&rules, Some(&num(99_000.0)), Some(&num(100_000.0)));
        assert!(tiny_round.round_number);
        assert_eq!(score_change(&rules, ChangeCategory::Metadata, &tiny_round), 0.3);

        let big_round = ChangeMagnitude::measure(&rules, Some(&num(10_000.0)), Some(&num(40_000.0)));
        assert_eq!(score_change(&rules, ChangeCategory::Metadata, &big_round), 1.0);
    }
}
