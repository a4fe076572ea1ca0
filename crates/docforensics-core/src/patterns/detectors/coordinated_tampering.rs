/// One actor modifying many documents in a short window
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{CoordinatedTamperingConfig, TimelineConfig};
use crate::error::EngineError;
use crate::patterns::{CorpusEntry, Detector, Pattern, PatternType};
use crate::scoring::{group_confidence, Severity};
use crate::timeline::{EventCategory, TimelineBuilder};

pub struct CoordinatedTamperingDetector {
    config: CoordinatedTamperingConfig,
    categorizer: TimelineBuilder,
}

struct Burst<'a> {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    modifications: usize,
    documents: BTreeSet<&'a str>,
}

impl CoordinatedTamperingDetector {
    pub fn new(config: CoordinatedTamperingConfig, timeline: TimelineConfig) -> Self {
        Self {
            config,
            categorizer: TimelineBuilder::new(timeline),
        }
    }

    /// Window holding the most distinct documents for one actor
    fn widest_burst<'a>(&self, edits: &[(DateTime<Utc>, &'a str)]) -> Option<Burst<'a>> {
        let window = Duration::seconds(self.config.window_secs);
        let mut best: Option<Burst<'a>> = None;
        for (start_index, (start, _)) in edits.iter().enumerate() {
            let inside: Vec<&(DateTime<Utc>, &'a str)> = edits[start_index..]
                .iter()
                .take_while(|(t, _)| *t - *start <= window)
                .collect();
            let documents: BTreeSet<&'a str> = inside.iter().map(|(_, doc)| *doc).collect();
            let wider = best
                .as_ref()
                .map_or(true, |b| documents.len() > b.documents.len());
            if wider {
                best = Some(Burst {
                    start: *start,
                    end: inside.last().map_or(*start, |(t, _)| *t),
                    modifications: inside.len(),
                    documents,
                });
            }
        }
        best
    }
}

impl Detector for CoordinatedTamperingDetector {
    fn name(&self) -> &'static str {
        "coordinated_tampering"
    }

    fn scan(&self, corpus: &[CorpusEntry]) -> Result<Vec<Pattern>, EngineError> {
        let mut by_actor: BTreeMap<&str, Vec<(DateTime<Utc>, &str)>> = BTreeMap::new();
        for entry in corpus {
            for event in &entry.events {
                let Some(actor) = event.actor.as_deref() else {
                    continue;
                };
                if self.categorizer.categorize(event) == EventCategory::Modification {
                    by_actor
                        .entry(actor)
                        .or_default()
                        .push((event.timestamp, entry.document_id.as_str()));
                }
            }
        }

        let min_documents = self.config.min_documents.max(2);
        let mut patterns = Vec::new();
        for (actor, mut edits) in by_actor {
            edits.sort();
            let Some(burst) = self.widest_burst(&edits) else {
                continue;
            };
            if burst.documents.len() < min_documents {
                continue;
            }
            let span = (burst.end - burst.start).num_seconds();
            let ids: Vec<String> = burst.documents.iter().map(|d| d.to_string()).collect();
            // Tighter bursts relative to the window are stronger evidence
            let tightness = if self.config.window_secs > 0 {
                1.0 - span as f64 / self.config.window_secs as f64
            } else {
                1.0
            };
            patterns.push(
                Pattern::new(
                    PatternType::CoordinatedTampering,
                    Severity::High,
                    format!(
                        "{} modified {} documents within {}s",
                        actor,
                        burst.documents.len(),
                        span
                    ),
                    ids,
                    self.config.risk_score,
                    group_confidence(burst.documents.len(), min_documents, 0.5 + 0.5 * tightness),
                )
                .with_evidence("actor", actor)
                .with_evidence("document_count", burst.documents.len())
                .with_evidence("modification_count", burst.modifications)
                .with_evidence("window_start", burst.start.to_rfc3339())
                .with_evidence("window_end", burst.end.to_rfc3339())
                .with_evidence("window_secs", self.config.window_secs),
            );
        }
        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::tests::entry;
    use crate::timeline::tests::at;
    use crate::timeline::ForensicEvent;

    fn edited(id: &str, actor: &str, minute: u32) -> CorpusEntry {
        let mut e = entry(id);
        e.events = vec![
            ForensicEvent::new(format!("{}-c", id), at(8, 0, 0), "document_created"),
            ForensicEvent::new(format!("{}-m", id), at(10, minute, 0), "document_modified").with_actor(actor),
        ];
        e
    }

    fn scan(corpus: &[CorpusEntry]) -> Vec<Pattern> {
        CoordinatedTamperingDetector::new(CoordinatedTamperingConfig::default(), TimelineConfig::default())
            .scan(corpus)
            .unwrap()
    }

    #[test]
    fn test_actor_touching_many_documents_flagged() {
        let corpus: Vec<CorpusEntry> = (0..5)
            .map(|i| edited(&format!("doc-{}", i), "mallory", i * 5))
            .chain([edited("doc-x", "alice", 1)])
            .collect();
        let patterns = scan(&corpus);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].evidence["actor"], "mallory");
        assert_eq!(patterns[0].evidence["document_count"], 5);
        assert_eq!(patterns[0].affected_documents.len(), 5);
    }

    #[test]
    fn test_edits_spread_over_hours_are_clean() {
        let mut corpus = Vec::new();
        for i in 0..5u32 {
            let mut e = entry(&format!("doc-{}", i));
            e.events = vec![ForensicEvent::new("m", at(9 + i * 2, 0, 0), "document_modified").with_actor("mallory")];
            corpus.push(e);
        }
        assert!(scan(&corpus).is_empty());
    }
}
