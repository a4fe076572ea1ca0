use rayon::prelude::*;
use std::borrow::Cow;
use tracing::info;

pub mod config;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod patterns;
pub mod scoring;
pub mod timeline;
pub mod tree;

// Re-export the types callers handle directly
pub use config::EngineConfig;
pub use diff::{Change, ChangeCategory, ChangeType, DiffEngine, DiffResult, DiffStatistics};
pub use error::{ConfigError, EngineError, Result};
pub use fingerprint::{
    CandidateFingerprint, Fingerprint, FingerprintGenerator, HashAlgorithm, SimilarityResult,
};
pub use patterns::{
    AmountEdit, CorpusEntry, Detector, MiningReport, MiningSummary, Pattern, PatternMiner,
    PatternType,
};
pub use scoring::{RiskLevel, Severity};
pub use timeline::{
    AnomalyKind, EventCategory, ForensicEvent, LedgerSeal, TemporalAnomaly, Timeline,
    TimelineBuilder, TimelineEntry,
};
pub use tree::{DocumentNode, FieldPath, PathSegment, Scalar};

/// Forensic analysis engine
///
/// Holds the compiled rule tables for all four analyses. Every call is a
/// pure function of its arguments and the configuration, so one engine can
/// be shared across threads.
pub struct ForensicEngine {
    config: EngineConfig,
    diff: DiffEngine,
    fingerprints: FingerprintGenerator,
    timelines: TimelineBuilder,
    miner: PatternMiner,
}

impl ForensicEngine {
    /// Validate the configuration and compile its rule tables
    pub fn new(config: EngineConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            diff: DiffEngine::new(config.diff.clone())?,
            fingerprints: FingerprintGenerator::new(config.fingerprint.clone())?,
            timelines: TimelineBuilder::new(config.timeline.clone()),
            miner: PatternMiner::new(&config.patterns, &config.timeline)?,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Structural diff of two document snapshots
    pub fn compare(&self, old: &DocumentNode, new: &DocumentNode) -> Result<DiffResult> {
        self.diff.compare(old, new)
    }

    pub fn fingerprint(&self, tree: &DocumentNode) -> Result<Fingerprint> {
        self.fingerprints.generate(tree)
    }

    /// Fingerprint many documents in parallel, preserving input order
    pub fn fingerprint_batch(&self, trees: &[DocumentNode]) -> Result<Vec<Fingerprint>> {
        trees
            .par_iter()
            .map(|tree| self.fingerprints.generate(tree))
            .collect()
    }

    /// Pairwise similarity of two fingerprints
    pub fn similarity(&self, target: &Fingerprint, candidate: &Fingerprint, document_id: &str) -> SimilarityResult {
        fingerprint::similarity::compare(self.fingerprints.config(), target, candidate, document_id)
    }

    /// Candidates at or above `threshold`, most similar first
    pub fn find_similar(
        &self,
        target: &Fingerprint,
        candidates: &[CandidateFingerprint],
        threshold: f64,
    ) -> Result<Vec<SimilarityResult>> {
        fingerprint::similarity::find_similar(self.fingerprints.config(), target, candidates, threshold)
    }

    pub fn build_timeline(&self, document_id: &str, events: &[ForensicEvent]) -> Result<Timeline> {
        self.timelines.build(document_id, events)
    }

    /// Run the six corpus detectors
    ///
    /// Entries without a fingerprint are fingerprinted first so the
    /// template detector sees the whole corpus.
    pub fn detect_patterns(&self, corpus: &[CorpusEntry]) -> Result<Vec<Pattern>> {
        let corpus = self.with_fingerprints(corpus)?;
        self.miner.detect(&corpus)
    }

    /// Corpus scan with a summary of the findings
    pub fn mine(&self, corpus: &[CorpusEntry]) -> Result<MiningReport> {
        let corpus = self.with_fingerprints(corpus)?;
        let report = self.miner.mine(&corpus)?;
        info!(
            documents = report.summary.documents_scanned,
            patterns = report.summary.total_patterns,
            escalate = report.summary.requires_escalation,
            "Mining report ready"
        );
        Ok(report)
    }

    fn with_fingerprints<'a>(&self, corpus: &'a [CorpusEntry]) -> Result<Cow<'a, [CorpusEntry]>> {
        if corpus.iter().all(|entry| entry.fingerprint.is_some()) {
            return Ok(Cow::Borrowed(corpus));
        }
        let filled = corpus
            .par_iter()
            .map(|entry| -> Result<CorpusEntry> {
                let mut entry = entry.clone();
                // Non-map fields are left for the miner to reject with the corpus path
                if entry.fingerprint.is_none() && entry.fields.as_map().is_some() {
                    entry.fingerprint = Some(self.fingerprints.generate(&entry.fields)?);
                }
                Ok(entry)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Cow::Owned(filled))
    }
}
