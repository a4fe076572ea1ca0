/// Large groups of documents with an identical shape
use std::collections::BTreeMap;

use super::submitters_of;
use crate::config::TemplateFraudConfig;
use crate::error::EngineError;
use crate::patterns::{CorpusEntry, Detector, Pattern, PatternType};
use crate::scoring::{group_confidence, round4};

pub struct TemplateFraudDetector {
    config: TemplateFraudConfig,
}

impl TemplateFraudDetector {
    pub fn new(config: TemplateFraudConfig) -> Self {
        Self { config }
    }
}

impl Detector for TemplateFraudDetector {
    fn name(&self) -> &'static str {
        "template_fraud"
    }

    fn scan(&self, corpus: &[CorpusEntry]) -> Result<Vec<Pattern>, EngineError> {
        let fingerprinted = corpus.iter().filter(|e| e.fingerprint.is_some()).count();
        let mut groups: BTreeMap<&str, Vec<&CorpusEntry>> = BTreeMap::new();
        for entry in corpus {
            if let Some(fingerprint) = &entry.fingerprint {
                groups
                    .entry(fingerprint.structural_hash.as_str())
                    .or_default()
                    .push(entry);
            }
        }

        let min_group = self.config.min_group_size.max(2);
        let patterns = groups
            .into_iter()
            .filter(|(_, members)| members.len() >= min_group)
            .map(|(hash, members)| {
                let share = members.len() as f64 / fingerprinted as f64;
                let ids: Vec<String> = members.iter().map(|e| e.document_id.clone()).collect();
                let submitters = submitters_of(members.iter().copied());
                // Many submitters sharing one shape looks like ordinary template use
                let concentration = if submitters.is_empty() {
                    0.5
                } else {
                    1.0 / submitters.len() as f64
                };
                Pattern::new(
                    PatternType::TemplateFraud,
                    self.config.severity,
                    format!("{} documents share an identical structure", members.len()),
                    ids,
                    self.config.risk_weight,
                    group_confidence(members.len(), min_group, concentration),
                )
                .with_evidence("structural_hash", hash)
                .with_evidence("group_size", members.len())
                .with_evidence("corpus_share", round4(share))
                .with_evidence("submitters", submitters)
            })
            .collect();
        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FingerprintConfig;
    use crate::fingerprint::FingerprintGenerator;
    use crate::scoring::Severity;
    use crate::tree::DocumentNode;
    use serde_json::json;

    fn fingerprinted(id: &str, fields: serde_json::Value) -> CorpusEntry {
        let tree = DocumentNode::from(fields);
        let mut e = CorpusEntry::new(id, tree.clone());
        e.fingerprint = Some(
            FingerprintGenerator::new(FingerprintConfig::default())
                .unwrap()
                .generate(&tree)
                .unwrap(),
        );
        e
    }

    fn corpus() -> Vec<CorpusEntry> {
        let mut corpus: Vec<CorpusEntry> = (0..5)
            .map(|i| fingerprinted(&format!("t{}", i), json!({"name": format!("n{}", i), "amount": i})))
            .collect();
        corpus.push(fingerprinted("odd", json!({"other": true})));
        corpus.push(CorpusEntry::new("raw", DocumentNode::from(json!({"name": "x", "amount": 1}))));
        corpus
    }

    #[test]
    fn test_shared_shape_group_flagged_at_configured_severity() {
        let patterns = TemplateFraudDetector::new(TemplateFraudConfig::default())
            .scan(&corpus())
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].severity, Severity::Medium);
        assert_eq!(patterns[0].risk_score, 0.5);
        assert_eq!(patterns[0].evidence["group_size"], 5);
    }

    #[test]
    fn test_severity_is_policy() {
        let config = TemplateFraudConfig {
            severity: Severity::Low,
            risk_weight: 0.1,
            ..TemplateFraudConfig::default()
        };
        let patterns = TemplateFraudDetector::new(config).scan(&corpus()).unwrap();
        assert_eq!(patterns[0].severity, Severity::Low);
        assert_eq!(patterns[0].risk_score, 0.1);
    }
}
