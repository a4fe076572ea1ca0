/// Bot-like submission cadence from one submitter
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::RapidSubmissionsConfig;
use crate::error::EngineError;
use crate::patterns::{CorpusEntry, Detector, Pattern, PatternType};
use crate::scoring::{group_confidence, round4, Severity};

pub struct RapidSubmissionsDetector {
    config: RapidSubmissionsConfig,
}

impl RapidSubmissionsDetector {
    pub fn new(config: RapidSubmissionsConfig) -> Self {
        Self { config }
    }
}

impl Detector for RapidSubmissionsDetector {
    fn name(&self) -> &'static str {
        "rapid_submissions"
    }

    fn scan(&self, corpus: &[CorpusEntry]) -> Result<Vec<Pattern>, EngineError> {
        let mut by_submitter: BTreeMap<&str, Vec<(DateTime<Utc>, &str)>> = BTreeMap::new();
        for entry in corpus {
            if let (Some(submitter), Some(at)) = (entry.submitter.as_deref(), entry.submitted_at) {
                by_submitter
                    .entry(submitter)
                    .or_default()
                    .push((at, entry.document_id.as_str()));
            }
        }

        let min_submissions = self.config.min_submissions.max(2);
        let mut patterns = Vec::new();
        for (submitter, mut submissions) in by_submitter {
            if submissions.len() < min_submissions {
                continue;
            }
            submissions.sort();

            let intervals: Vec<f64> = submissions
                .windows(2)
                .map(|pair| (pair[1].0 - pair[0].0).num_milliseconds() as f64 / 1000.0)
                .collect();
            let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
            if mean >= self.config.max_mean_interval_secs {
                continue;
            }
            let min = intervals.iter().copied().fold(f64::INFINITY, f64::min);
            let max = intervals.iter().copied().fold(0.0_f64, f64::max);
            let span = intervals.iter().sum::<f64>();

            let signal = if self.config.max_mean_interval_secs > 0.0 {
                1.0 - mean / self.config.max_mean_interval_secs
            } else {
                1.0
            };
            let ids: Vec<String> = submissions.iter().map(|(_, id)| id.to_string()).collect();

            patterns.push(
                Pattern::new(
                    PatternType::RapidSubmissions,
                    Severity::High,
                    format!(
                        "{} submitted {} documents with a mean interval of {:.1}s",
                        submitter,
                        submissions.len(),
                        mean
                    ),
                    ids,
                    self.config.risk_score,
                    group_confidence(submissions.len(), min_submissions, signal),
                )
                .with_evidence("submitter", submitter)
                .with_evidence("submission_count", submissions.len())
                .with_evidence("mean_interval_secs", round4(mean))
                .with_evidence("min_interval_secs", round4(min))
                .with_evidence("max_interval_secs", round4(max))
                .with_evidence("span_secs", round4(span)),
            );
        }
        Ok(patterns)
    }
}
