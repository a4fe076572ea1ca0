/// Timeline reconstruction
///
/// Turns a document's ordered event log into a categorized, risk-annotated
/// timeline and runs six temporal detectors over it. Input order is kept as
/// given: a log that goes backwards in time is itself a finding.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

use crate::config::TimelineConfig;
use crate::error::EngineError;
use crate::scoring::{round4, RiskLevel, Severity};
use crate::tree::FieldPath;

pub mod detectors;
pub mod report;

pub use detectors::{AnomalyKind, TemporalAnomaly};

/// Coarse event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Creation,
    Modification,
    Access,
    Blockchain,
    Attestation,
    Security,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventCategory::Creation => "creation",
            EventCategory::Modification => "modification",
            EventCategory::Access => "access",
            EventCategory::Blockchain => "blockchain",
            EventCategory::Attestation => "attestation",
            EventCategory::Security => "security",
        };
        f.write_str(name)
    }
}

/// Sealed hash and seal time supplied by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSeal {
    pub sealed_hash: String,
    pub sealed_at: DateTime<Utc>,
}

/// One input event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    /// Overrides the lookup table when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<EventCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default, alias = "raw_payload")]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seal: Option<LedgerSeal>,
}

impl ForensicEvent {
    pub fn new(event_id: impl Into<String>, timestamp: DateTime<Utc>, event_type: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp,
            event_type: event_type.into(),
            category: None,
            actor: None,
            severity: None,
            risk_score: 0.0,
            payload: serde_json::Value::Null,
            seal: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_seal(mut self, sealed_hash: impl Into<String>, sealed_at: DateTime<Utc>) -> Self {
        self.seal = Some(LedgerSeal {
            sealed_hash: sealed_hash.into(),
            sealed_at,
        });
        self
    }
}

/// An event placed on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub event: ForensicEvent,
    pub category: EventCategory,
    /// Event's own risk raised by the detectors that flagged it
    pub risk_score: f64,
    pub flags: Vec<AnomalyKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub pattern_count: usize,
    pub requires_investigation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineStatistics {
    pub total_events: usize,
    pub events_by_category: BTreeMap<EventCategory, usize>,
    pub first_event: Option<DateTime<Utc>>,
    pub last_event: Option<DateTime<Utc>>,
    pub distinct_actors: usize,
    /// Start of the hour with the most events
    pub peak_hour: Option<DateTime<Utc>>,
}

/// Reconstructed timeline of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub document_id: String,
    pub events: Vec<TimelineEntry>,
    pub suspicious_patterns: Vec<String>,
    pub anomalies: Vec<TemporalAnomaly>,
    pub risk_assessment: RiskAssessment,
    pub statistics: TimelineStatistics,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Builds timelines under one configuration
#[derive(Debug, Clone)]
pub struct TimelineBuilder {
    config: TimelineConfig,
}

impl TimelineBuilder {
    pub fn new(config: TimelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Category for an event: explicit, then lookup table, then keywords
    pub fn categorize(&self, event: &ForensicEvent) -> EventCategory {
        if let Some(category) = event.category {
            return category;
        }
        let event_type = event.event_type.trim().to_lowercase();
        if let Some(category) = self.config.event_categories.get(&event_type) {
            return *category;
        }
        self.infer_category(&event_type)
    }

    fn infer_category(&self, event_type: &str) -> EventCategory {
        let has = |words: &[&str]| words.iter().any(|w| event_type.contains(w));
        if has(&["seal", "anchor", "blockchain", "ledger"]) {
            EventCategory::Blockchain
        } else if has(&["sign", "attest", "notar", "witness"]) {
            EventCategory::Attestation
        } else if self.is_failure(event_type) || has(&["login", "permission", "security", "alert"]) {
            EventCategory::Security
        } else if has(&["creat", "upload", "import"]) {
            EventCategory::Creation
        } else if has(&["modif", "edit", "updat", "delet", "replac", "chang", "revis"]) {
            EventCategory::Modification
        } else {
            EventCategory::Access
        }
    }

    pub(crate) fn is_failure(&self, event_type: &str) -> bool {
        let event_type = event_type.to_lowercase();
        self.config
            .failure_markers
            .iter()
            .any(|marker| event_type.contains(&marker.to_lowercase()))
    }

    /// Build the timeline for one document's event log
    pub fn build(&self, document_id: &str, events: &[ForensicEvent]) -> Result<Timeline, EngineError> {
        for (i, event) in events.iter().enumerate() {
            if !event.risk_score.is_finite() || !(0.0..=1.0).contains(&event.risk_score) {
                let path = FieldPath::root().key("events").index(i).key("risk_score");
                warn!(document_id, event_id = %event.event_id, "Rejected event with invalid risk score");
                return Err(EngineError::validation(
                    &path,
                    format!("risk score must be within [0, 1], got {}", event.risk_score),
                ));
            }
        }

        let categories: Vec<EventCategory> = events.iter().map(|e| self.categorize(e)).collect();
        let anomalies = detectors::run_all(self, events, &categories);

        let mut detector_total: BTreeMap<AnomalyKind, f64> = BTreeMap::new();
        for anomaly in &anomalies {
            *detector_total.entry(anomaly.kind).or_insert(0.0) += anomaly.contribution;
        }
        let risk_score = round4(detector_total.values().sum::<f64>().min(1.0));
        let risk_level = RiskLevel::from_score(risk_score);

        let entries = annotate(events, &categories, &anomalies);
        let suspicious_patterns: Vec<String> =
            anomalies.iter().map(|a| a.description.clone()).collect();
        let statistics = calculate_statistics(events, &categories);

        let risk_assessment = RiskAssessment {
            risk_level,
            risk_score,
            pattern_count: suspicious_patterns.len(),
            requires_investigation: risk_score >= self.config.investigation_threshold
                && !anomalies.is_empty(),
        };

        info!(
            document_id,
            events = events.len(),
            patterns = suspicious_patterns.len(),
            risk_level = %risk_level,
            "Timeline reconstructed"
        );

        Ok(Timeline {
            document_id: document_id.to_string(),
            events: entries,
            suspicious_patterns,
            anomalies,
            risk_assessment,
            statistics,
        })
    }
}

fn annotate(
    events: &[ForensicEvent],
    categories: &[EventCategory],
    anomalies: &[TemporalAnomaly],
) -> Vec<TimelineEntry> {
    events
        .iter()
        .zip(categories)
        .map(|(event, category)| {
            let touching: Vec<&TemporalAnomaly> = anomalies
                .iter()
                .filter(|a| a.event_ids.contains(&event.event_id))
                .collect();
            let flags: BTreeSet<AnomalyKind> = touching.iter().map(|a| a.kind).collect();
            let raised = event.risk_score + touching.iter().map(|a| a.contribution).sum::<f64>();
            TimelineEntry {
                event: event.clone(),
                category: *category,
                risk_score: round4(raised.min(1.0)),
                flags: flags.into_iter().collect(),
            }
        })
        .collect()
}

fn calculate_statistics(events: &[ForensicEvent], categories: &[EventCategory]) -> TimelineStatistics {
    let mut events_by_category = BTreeMap::new();
    for category in categories {
        *events_by_category.entry(*category).or_insert(0) += 1;
    }

    let actors: BTreeSet<&str> = events.iter().filter_map(|e| e.actor.as_deref()).collect();

    let mut hourly: BTreeMap<i64, usize> = BTreeMap::new();
    for event in events {
        *hourly.entry(event.timestamp.timestamp().div_euclid(3600)).or_insert(0) += 1;
    }
    // Earliest hour wins ties so the result is stable
    let peak_hour = hourly
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .and_then(|(hour, _)| DateTime::from_timestamp(*hour * 3600, 0));

    TimelineStatistics {
        total_events: events.len(),
        events_by_category,
        first_event: events.iter().map(|e| e.timestamp).min(),
        last_event: events.iter().map(|e| e.timestamp).max(),
        distinct_actors: actors.len(),
        peak_hour,
    }
}
