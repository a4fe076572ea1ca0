/// Financial edits by one submitter that are outsized or all one direction
use std::collections::BTreeMap;

use crate::config::AmountManipulationConfig;
use crate::error::EngineError;
use crate::patterns::{AmountEdit, CorpusEntry, Detector, Pattern, PatternType};
use crate::scoring::{group_confidence, round4, Severity};

pub struct AmountManipulationDetector {
    config: AmountManipulationConfig,
}

impl AmountManipulationDetector {
    pub fn new(config: AmountManipulationConfig) -> Self {
        Self { config }
    }

    /// Edits above the large-change threshold; a change away from zero always counts
    fn is_large(&self, edit: &AmountEdit) -> bool {
        match edit.percent_delta {
            Some(pct) => pct.abs() > self.config.large_edit_pct,
            None => edit.old_value != edit.new_value,
        }
    }
}

impl Detector for AmountManipulationDetector {
    fn name(&self) -> &'static str {
        "amount_manipulation"
    }

    fn scan(&self, corpus: &[CorpusEntry]) -> Result<Vec<Pattern>, EngineError> {
        let mut by_submitter: BTreeMap<&str, Vec<(&CorpusEntry, &AmountEdit)>> = BTreeMap::new();
        for entry in corpus {
            let Some(submitter) = entry.submitter.as_deref() else {
                continue;
            };
            for edit in &entry.amount_edits {
                by_submitter.entry(submitter).or_default().push((entry, edit));
            }
        }

        let mut patterns = Vec::new();
        for (submitter, edits) in by_submitter {
            let total = edits.len();
            let increases = edits.iter().filter(|(_, e)| e.is_increase()).count();
            let decreases = edits.iter().filter(|(_, e)| e.is_decrease()).count();
            let large = edits.iter().filter(|(_, e)| self.is_large(e)).count();

            let one_direction =
                total >= self.config.min_edits && (increases == total || decreases == total);
            let outsized = large >= self.config.min_large_edits.max(1);
            if !one_direction && !outsized {
                continue;
            }

            let deltas: Vec<f64> = edits.iter().filter_map(|(_, e)| e.percent_delta).collect();
            let mean_delta = if deltas.is_empty() {
                0.0
            } else {
                deltas.iter().sum::<f64>() / deltas.len() as f64
            };
            let max_delta = deltas.iter().map(|d| d.abs()).fold(0.0_f64, f64::max);

            let direction_share = increases.max(decreases) as f64 / total as f64;
            let large_share = large as f64 / total as f64;
            let signal = direction_share.max(large_share);

            let mut reasons = Vec::new();
            if outsized {
                reasons.push(format!("{} edits over {:.0}%", large, self.config.large_edit_pct));
            }
            if one_direction {
                let direction = if increases == total { "upward" } else { "downward" };
                reasons.push(format!("all {} edits {}", total, direction));
            }

            let ids: Vec<String> = edits.iter().map(|(e, _)| e.document_id.clone()).collect();
            let fields: Vec<String> = {
                let mut fields: Vec<String> = edits.iter().map(|(_, e)| e.field.clone()).collect();
                fields.sort();
                fields.dedup();
                fields
            };

            patterns.push(
                Pattern::new(
                    PatternType::AmountManipulation,
                    Severity::High,
                    format!(
                        "Suspicious financial edits by {}: {}",
                        submitter,
                        reasons.join(", ")
                    ),
                    ids,
                    self.config.risk_score,
                    group_confidence(total, self.config.min_edits, signal),
                )
                .with_evidence("submitter", submitter)
                .with_evidence("edit_count", total)
                .with_evidence("large_edit_count", large)
                .with_evidence("increases", increases)
                .with_evidence("decreases", decreases)
                .with_evidence("mean_percent_delta", round4(mean_delta))
                .with_evidence("max_abs_percent_delta", round4(max_delta))
                .with_evidence("fields", fields),
            );
        }
        Ok(patterns)
    }
}
