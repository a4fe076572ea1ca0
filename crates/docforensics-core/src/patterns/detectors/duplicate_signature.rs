/// Same signature image on more than one document
use std::collections::BTreeMap;

use super::submitters_of;
use crate::config::DuplicateSignatureConfig;
use crate::error::EngineError;
use crate::patterns::{CorpusEntry, Detector, Pattern, PatternType};
use crate::scoring::{group_confidence, Severity};

pub struct DuplicateSignatureDetector {
    config: DuplicateSignatureConfig,
}

impl DuplicateSignatureDetector {
    pub fn new(config: DuplicateSignatureConfig) -> Self {
        Self { config }
    }
}

impl Detector for DuplicateSignatureDetector {
    fn name(&self) -> &'static str {
        "duplicate_signature"
    }

    fn scan(&self, corpus: &[CorpusEntry]) -> Result<Vec<Pattern>, EngineError> {
        let mut groups: BTreeMap<String, Vec<&CorpusEntry>> = BTreeMap::new();
        for entry in corpus {
            let Some(hash) = entry.signature_hash.as_deref() else {
                continue;
            };
            let hash = hash.trim().to_lowercase();
            if !hash.is_empty() {
                groups.entry(hash).or_default().push(entry);
            }
        }

        let min_documents = self.config.min_documents.max(2);
        let patterns = groups
            .into_iter()
            .filter(|(_, members)| members.len() >= min_documents)
            .map(|(hash, members)| {
                let ids: Vec<String> = members.iter().map(|e| e.document_id.clone()).collect();
                let submitters = submitters_of(members.iter().copied());
                Pattern::new(
                    PatternType::DuplicateSignature,
                    Severity::Critical,
                    format!("Signature image reused across {} documents", members.len()),
                    ids,
                    self.config.risk_score,
                    group_confidence(members.len(), min_documents, 1.0),
                )
                .with_evidence("signature_hash", hash)
                .with_evidence("document_count", members.len())
                .with_evidence("submitters", submitters)
            })
            .collect();
        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::tests::entry;

    fn signed(id: &str, hash: &str) -> CorpusEntry {
        let mut e = entry(id);
        e.signature_hash = Some(hash.to_string());
        e
    }

    #[test]
    fn test_shared_signature_grouped() {
        let corpus = vec![
            signed("a", "ABC123"),
            signed("b", "def456"),
            signed("c", "abc123 "),
            entry("d"),
        ];
        let patterns = DuplicateSignatureDetector::new(DuplicateSignatureConfig::default())
            .scan(&corpus)
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].affected_documents, vec!["a", "c"]);
        assert_eq!(patterns[0].severity, Severity::Critical);
        assert_eq!(patterns[0].risk_score, 0.95);
        assert_eq!(patterns[0].evidence["document_count"], 2);
    }

    #[test]
    fn test_unique_signatures_are_clean() {
        let corpus = vec![signed("a", "1"), signed("b", "2"), signed("c", "")];
        let patterns = DuplicateSignatureDetector::new(DuplicateSignatureConfig::default())
            .scan(&corpus)
            .unwrap();
        assert!(patterns.is_empty());
    }
}
