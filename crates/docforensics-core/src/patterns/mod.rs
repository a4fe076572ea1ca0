/// Corpus pattern mining
///
/// Cross-document fraud signatures found with cheap group-by and interval
/// statistics. Each signature is a `Detector`; the miner runs them in
/// parallel over one corpus snapshot and unions the findings. No detector
/// diffs document pairs.
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PatternConfig, TimelineConfig};
use crate::diff::{Change, ChangeCategory, ChangeType};
use crate::error::{ConfigError, EngineError};
use crate::fingerprint::Fingerprint;
use crate::scoring::{round4, Severity};
use crate::timeline::ForensicEvent;
use crate::tree::{DocumentNode, FieldPath};

pub mod detectors;

use detectors::{
    AmountManipulationDetector, CoordinatedTamperingDetector, DuplicateSignatureDetector,
    IdentityReuseDetector, RapidSubmissionsDetector, TemplateFraudDetector,
};

/// Fraud signature classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    DuplicateSignature,
    AmountManipulation,
    IdentityReuse,
    CoordinatedTampering,
    TemplateFraud,
    RapidSubmissions,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatternType::DuplicateSignature => "duplicate_signature",
            PatternType::AmountManipulation => "amount_manipulation",
            PatternType::IdentityReuse => "identity_reuse",
            PatternType::CoordinatedTampering => "coordinated_tampering",
            PatternType::TemplateFraud => "template_fraud",
            PatternType::RapidSubmissions => "rapid_submissions",
        };
        f.write_str(name)
    }
}

/// One financial-field edit recorded against a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountEdit {
    pub field: String,
    pub old_value: f64,
    pub new_value: f64,
    #[serde(default)]
    pub percent_delta: Option<f64>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
}

impl AmountEdit {
    /// Edit record for a modified financial value, `None` for anything else
    pub fn from_change(change: &Change) -> Option<Self> {
        if change.category != ChangeCategory::Financial || change.change_type != ChangeType::Modified {
            return None;
        }
        let number = |node: Option<&DocumentNode>| node?.as_scalar()?.as_number();
        Some(Self {
            field: change.path.to_string(),
            old_value: number(change.old_value.as_ref())?,
            new_value: number(change.new_value.as_ref())?,
            percent_delta: change.percent_delta,
            edited_at: None,
        })
    }

    pub fn at(mut self, edited_at: DateTime<Utc>) -> Self {
        self.edited_at = Some(edited_at);
        self
    }

    pub fn is_increase(&self) -> bool {
        self.new_value > self.old_value
    }

    pub fn is_decrease(&self) -> bool {
        self.new_value < self.old_value
    }
}

/// One document as seen by the miner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub document_id: String,
    pub fields: DocumentNode,
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub signature_hash: Option<String>,
    #[serde(default)]
    pub submitter: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Falls back to the document id when absent
    #[serde(default)]
    pub borrower_id: Option<String>,
    #[serde(default)]
    pub events: Vec<ForensicEvent>,
    #[serde(default)]
    pub amount_edits: Vec<AmountEdit>,
}

impl CorpusEntry {
    pub fn new(document_id: impl Into<String>, fields: DocumentNode) -> Self {
        Self {
            document_id: document_id.into(),
            fields,
            fingerprint: None,
            signature_hash: None,
            submitter: None,
            submitted_at: None,
            borrower_id: None,
            events: Vec::new(),
            amount_edits: Vec::new(),
        }
    }

    pub fn borrower(&self) -> &str {
        self.borrower_id.as_deref().unwrap_or(&self.document_id)
    }
}

/// A corpus-level finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_id: Uuid,
    pub pattern_type: PatternType,
    pub severity: Severity,
    pub description: String,
    pub affected_documents: Vec<String>,
    /// Raw statistics behind the score, for reviewers
    pub evidence: BTreeMap<String, serde_json::Value>,
    pub risk_score: f64,
    pub confidence: f64,
    pub recommendation: String,
}

impl Pattern {
    pub fn new(
        pattern_type: PatternType,
        severity: Severity,
        description: impl Into<String>,
        mut affected_documents: Vec<String>,
        risk_score: f64,
        confidence: f64,
    ) -> Self {
        affected_documents.sort();
        affected_documents.dedup();
        Self {
            pattern_id: Uuid::new_v4(),
            pattern_type,
            severity,
            description: description.into(),
            affected_documents,
            evidence: BTreeMap::new(),
            risk_score: round4(risk_score.clamp(0.0, 1.0)),
            confidence: round4(confidence.clamp(0.0, 1.0)),
            recommendation: severity.recommendation().to_string(),
        }
    }

    pub fn with_evidence(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.evidence.insert(key.to_string(), value.into());
        self
    }
}

/// A pluggable corpus scan
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn scan(&self, corpus: &[CorpusEntry]) -> Result<Vec<Pattern>, EngineError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiningSummary {
    pub documents_scanned: usize,
    pub total_patterns: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_type: BTreeMap<PatternType, usize>,
    pub highest_risk: f64,
    pub highest_severity: Option<Severity>,
    /// Any High or Critical finding
    pub requires_escalation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningReport {
    pub summary: MiningSummary,
    pub patterns: Vec<Pattern>,
}

impl MiningReport {
    pub fn new(documents_scanned: usize, patterns: Vec<Pattern>) -> Self {
        let mut summary = MiningSummary {
            documents_scanned,
            total_patterns: patterns.len(),
            ..MiningSummary::default()
        };
        for pattern in &patterns {
            *summary.by_severity.entry(pattern.severity).or_insert(0) += 1;
            *summary.by_type.entry(pattern.pattern_type).or_insert(0) += 1;
            summary.highest_risk = summary.highest_risk.max(pattern.risk_score);
        }
        summary.highest_severity = summary.by_severity.keys().next_back().copied();
        summary.requires_escalation = summary
            .highest_severity
            .is_some_and(|s| s >= Severity::High);
        Self { summary, patterns }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs a set of detectors over a corpus
pub struct PatternMiner {
    detectors: Vec<Box<dyn Detector>>,
}

impl PatternMiner {
    /// The six standard detectors
    pub fn new(config: &PatternConfig, timeline: &TimelineConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_detectors(vec![
            Box::new(DuplicateSignatureDetector::new(config.duplicate_signature.clone())),
            Box::new(AmountManipulationDetector::new(config.amount_manipulation.clone())),
            Box::new(IdentityReuseDetector::new(config.identity_reuse.clone())?),
            Box::new(CoordinatedTamperingDetector::new(
                config.coordinated_tampering.clone(),
                timeline.clone(),
            )),
            Box::new(TemplateFraudDetector::new(config.template_fraud.clone())),
            Box::new(RapidSubmissionsDetector::new(config.rapid_submissions.clone())),
        ]))
    }

    pub fn with_detectors(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Run every detector and union the findings
    ///
    /// Results are ordered by risk (highest first), then pattern type, then
    /// first affected document, independent of corpus order.
    pub fn detect(&self, corpus: &[CorpusEntry]) -> Result<Vec<Pattern>, EngineError> {
        validate_corpus(corpus)?;

        let per_detector: Vec<Vec<Pattern>> = self
            .detectors
            .par_iter()
            .map(|detector| -> Result<Vec<Pattern>, EngineError> {
                let found = detector.scan(corpus).map_err(|err| match err {
                    EngineError::Validation { .. } => err,
                    other => EngineError::internal(format!("running the {} detector", detector.name()), other),
                })?;
                debug!(detector = detector.name(), patterns = found.len(), "Detector finished");
                Ok(found)
            })
            .collect::<Result<_, _>>()?;

        let mut patterns: Vec<Pattern> = per_detector.into_iter().flatten().collect();
        patterns.sort_by(|a, b| {
            b.risk_score
                .total_cmp(&a.risk_score)
                .then_with(|| a.pattern_type.cmp(&b.pattern_type))
                .then_with(|| a.affected_documents.first().cmp(&b.affected_documents.first()))
        });

        info!(
            documents = corpus.len(),
            patterns = patterns.len(),
            "Corpus scan complete"
        );
        Ok(patterns)
    }

    pub fn mine(&self, corpus: &[CorpusEntry]) -> Result<MiningReport, EngineError> {
        Ok(MiningReport::new(corpus.len(), self.detect(corpus)?))
    }
}

fn validate_corpus(corpus: &[CorpusEntry]) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for (i, entry) in corpus.iter().enumerate() {
        let entry_path = FieldPath::root().key("corpus").index(i);
        if entry.document_id.trim().is_empty() {
            return Err(EngineError::validation(
                &entry_path.key("document_id"),
                "document id must not be empty",
            ));
        }
        if !seen.insert(entry.document_id.as_str()) {
            warn!(document_id = %entry.document_id, "Duplicate document id in corpus");
            return Err(EngineError::validation(
                &entry_path.key("document_id"),
                format!("duplicate document id {}", entry.document_id),
            ));
        }
        if entry.fields.as_map().is_none() {
            return Err(EngineError::validation(
                &entry_path.key("fields"),
                format!("document fields must be a map, found {}", entry.fields.kind()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DiffRules;
    use crate::diff::DiffEngine;
    use serde_json::json;

    pub(crate) fn entry(id: &str) -> CorpusEntry {
        CorpusEntry::new(id, DocumentNode::from(json!({"document_id": id})))
    }

    fn miner() -> PatternMiner {
        PatternMiner::new(&PatternConfig::default(), &TimelineConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_corpus_is_not_an_error() {
        let report = miner().mine(&[]).unwrap();
        assert!(report.patterns.is_empty());
        assert_eq!(report.summary.documents_scanned, 0);
        assert!(!report.summary.requires_escalation);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = miner().detect(&[entry("a"), entry("a")]).unwrap_err();
        assert!(err.to_string().contains("corpus[1].document_id"));
    }

    #[test]
    fn test_non_map_fields_rejected() {
        let mut bad = entry("a");
        bad.fields = DocumentNode::from(json!([1, 2]));
        let err = miner().detect(&[bad]).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("corpus[0].fields"));
    }

    #[test]
    fn test_default_miner_has_six_detectors() {
        assert_eq!(
            miner().detector_names(),
            vec![
                "duplicate_signature",
                "amount_manipulation",
                "identity_reuse",
                "coordinated_tampering",
                "template_fraud",
                "rapid_submissions"
            ]
        );
    }

    #[test]
    fn test_amount_edit_from_financial_change() {
        let engine = DiffEngine::new(DiffRules::default()).unwrap();
        let result = engine
            .compare(
                &DocumentNode::from(json!({"loan_amount": "$100,000", "notes": "a"})),
                &DocumentNode::from(json!({"loan_amount": "$150,000", "notes": "b"})),
            )
            .unwrap();
        let edits: Vec<AmountEdit> = result.changes.iter().filter_map(AmountEdit::from_change).collect();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].field, "loan_amount");
        assert_eq!(edits[0].new_value, 150_000.0);
        assert_eq!(edits[0].percent_delta, Some(50.0));
        assert!(edits[0].is_increase());
    }

    struct Broken;

    impl Detector for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn scan(&self, _corpus: &[CorpusEntry]) -> Result<Vec<Pattern>, EngineError> {
            Err(ConfigError::InvalidValue {
                field: "broken",
                message: "unavailable".to_string(),
            }
            .into())
        }
    }

    #[test]
    fn test_detector_failure_names_the_detector() {
        let err = PatternMiner::with_detectors(vec![Box::new(Broken)])
            .detect(&[entry("a")])
            .unwrap_err();
        assert!(matches!(err, EngineError::Internal { .. }));
        assert!(err.to_string().contains("broken detector"));
    }

    #[test]
    fn test_report_summary_counts() {
        let patterns = vec![
            Pattern::new(PatternType::TemplateFraud, Severity::Medium, "t", vec!["a".into()], 0.5, 0.6),
            Pattern::new(PatternType::DuplicateSignature, Severity::Critical, "d", vec!["b".into(), "a".into()], 0.95, 0.8),
        ];
        let report = MiningReport::new(4, patterns);
        assert_eq!(report.summary.total_patterns, 2);
        assert_eq!(report.summary.highest_severity, Some(Severity::Critical));
        assert_eq!(report.summary.highest_risk, 0.95);
        assert!(report.summary.requires_escalation);
        assert_eq!(report.patterns[1].affected_documents, vec!["a", "b"]);
    }
}
