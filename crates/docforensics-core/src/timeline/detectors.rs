/// Temporal anomaly detectors
///
/// Six independent scans over the event log in the order it was supplied.
/// A detector that fires contributes its configured weight once, split
/// evenly over the anomalies it reports.
use chrono::{Datelike, Duration, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::scoring::round4;
use crate::timeline::{EventCategory, ForensicEvent, TimelineBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    RapidModifications,
    OffHoursAccess,
    FailureCluster,
    MissingSeal,
    OutOfOrder,
    ActorDominance,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnomalyKind::RapidModifications => "rapid_modifications",
            AnomalyKind::OffHoursAccess => "off_hours_access",
            AnomalyKind::FailureCluster => "failure_cluster",
            AnomalyKind::MissingSeal => "missing_seal",
            AnomalyKind::OutOfOrder => "out_of_order",
            AnomalyKind::ActorDominance => "actor_dominance",
        };
        f.write_str(name)
    }
}

/// One detector finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalAnomaly {
    pub kind: AnomalyKind,
    pub description: String,
    pub event_ids: Vec<String>,
    /// Share of the timeline risk score this finding accounts for
    pub contribution: f64,
}

struct Finding {
    description: String,
    event_ids: Vec<String>,
}

/// Run every detector and weight the findings
pub(crate) fn run_all(
    builder: &TimelineBuilder,
    events: &[ForensicEvent],
    categories: &[EventCategory],
) -> Vec<TemporalAnomaly> {
    let weights = &builder.config().weights;
    let scans: [(AnomalyKind, f64, Vec<Finding>); 6] = [
        (
            AnomalyKind::RapidModifications,
            weights.rapid_modifications,
            rapid_modifications(builder, events, categories),
        ),
        (
            AnomalyKind::OffHoursAccess,
            weights.off_hours_access,
            off_hours_access(builder, events, categories),
        ),
        (
            AnomalyKind::FailureCluster,
            weights.failure_cluster,
            failure_clusters(builder, events, categories),
        ),
        (
            AnomalyKind::MissingSeal,
            weights.missing_seal,
            missing_seals(builder, events, categories),
        ),
        (AnomalyKind::OutOfOrder, weights.out_of_order, out_of_order(events)),
        (
            AnomalyKind::ActorDominance,
            weights.actor_dominance,
            actor_dominance(builder, events, categories),
        ),
    ];

    let mut anomalies = Vec::new();
    for (kind, weight, findings) in scans {
        if findings.is_empty() {
            continue;
        }
        debug!(detector = %kind, findings = findings.len(), "Temporal detector fired");
        let share = round4(weight / findings.len() as f64);
        anomalies.extend(findings.into_iter().map(|finding| TemporalAnomaly {
            kind,
            description: finding.description,
            event_ids: finding.event_ids,
            contribution: share,
        }));
    }
    anomalies
}

/// Indices of events in one category, in input order
fn indices_in(categories: &[EventCategory], wanted: EventCategory) -> Vec<usize> {
    categories
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == wanted)
        .map(|(i, _)| i)
        .collect()
}

/// Non-overlapping bursts of at least `min_count` events within `window`
///
/// A burst only grows while timestamps stay inside `[start, start + window]`.
fn bursts(events: &[ForensicEvent], indices: &[usize], window: Duration, min_count: usize) -> Vec<Vec<usize>> {
    let mut found = Vec::new();
    let mut start = 0;
    while start < indices.len() {
        let start_time = events[indices[start]].timestamp;
        let mut members = vec![indices[start]];
        for &i in &indices[start + 1..] {
            let offset = events[i].timestamp - start_time;
            if offset >= Duration::zero() && offset <= window {
                members.push(i);
            } else {
                break;
            }
        }
        if members.len() >= min_count.max(1) {
            start += members.len();
            found.push(members);
        } else {
            start += 1;
        }
    }
    found
}

fn ids(events: &[ForensicEvent], indices: &[usize]) -> Vec<String> {
    indices.iter().map(|&i| events[i].event_id.clone()).collect()
}

fn rapid_modifications(
    builder: &TimelineBuilder,
    events: &[ForensicEvent],
    categories: &[EventCategory],
) -> Vec<Finding> {
    let config = builder.config();
    let window = Duration::seconds(config.rapid_modification_window_secs);
    let modifications = indices_in(categories, EventCategory::Modification);

    bursts(events, &modifications, window, config.rapid_modification_count)
        .into_iter()
        .map(|burst| Finding {
            description: format!(
                "Rapid modifications: {} changes within {}s starting at {}",
                burst.len(),
                config.rapid_modification_window_secs,
                events[burst[0]].timestamp.format("%Y-%m-%d %H:%M:%S")
            ),
            event_ids: ids(events, &burst),
        })
        .collect()
}

fn off_hours_access(
    builder: &TimelineBuilder,
    events: &[ForensicEvent],
    categories: &[EventCategory],
) -> Vec<Finding> {
    let config = builder.config();
    let offset = Duration::minutes(i64::from(config.utc_offset_minutes));

    // Ledger sealing is automated and runs around the clock
    let flagged: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(i, _)| categories[*i] != EventCategory::Blockchain)
        .filter(|(_, event)| {
            let local = event.timestamp + offset;
            let hour = local.hour();
            let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
            hour < config.business_hours_start
                || hour >= config.business_hours_end
                || (config.weekends_off_hours && weekend)
        })
        .map(|(i, _)| i)
        .collect();

    if flagged.is_empty() {
        return Vec::new();
    }
    vec![Finding {
        description: format!(
            "Off-hours activity: {} events outside {:02}:00-{:02}:00",
            flagged.len(),
            config.business_hours_start,
            config.business_hours_end
        ),
        event_ids: ids(events, &flagged),
    }]
}

fn failure_clusters(
    builder: &TimelineBuilder,
    events: &[ForensicEvent],
    categories: &[EventCategory],
) -> Vec<Finding> {
    let config = builder.config();
    let failures: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(i, event)| {
            builder.is_failure(&event.event_type)
                || (categories[*i] == EventCategory::Security && builder.is_failure(&payload_text(event)))
        })
        .map(|(i, _)| i)
        .collect();

    bursts(
        events,
        &failures,
        Duration::seconds(config.failure_window_secs),
        config.failure_cluster_size,
    )
    .into_iter()
    .map(|cluster| Finding {
        description: format!(
            "Failed-attempt cluster: {} failures within {}s starting at {}",
            cluster.len(),
            config.failure_window_secs,
            events[cluster[0]].timestamp.format("%Y-%m-%d %H:%M:%S")
        ),
        event_ids: ids(events, &cluster),
    })
    .collect()
}

/// Outcome text some event sources put in the payload instead of the type
fn payload_text(event: &ForensicEvent) -> String {
    ["outcome", "status", "result"]
        .iter()
        .filter_map(|key| event.payload.get(key).and_then(|v| v.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn missing_seals(
    builder: &TimelineBuilder,
    events: &[ForensicEvent],
    categories: &[EventCategory],
) -> Vec<Finding> {
    let config = builder.config();
    if !config.require_seals || events.is_empty() {
        return Vec::new();
    }
    let sla = Duration::seconds(config.seal_sla_secs);
    let log_end = events.iter().map(|e| e.timestamp).max();

    let seal_times: Vec<_> = events
        .iter()
        .enumerate()
        .filter(|(i, event)| categories[*i] == EventCategory::Blockchain || event.seal.is_some())
        .map(|(_, event)| event.seal.as_ref().map_or(event.timestamp, |s| s.sealed_at))
        .collect();

    let unsealed: Vec<usize> = indices_in(categories, EventCategory::Modification)
        .into_iter()
        .filter(|&i| {
            let modified = events[i].timestamp;
            let deadline = modified + sla;
            // A modification whose window is still open at the end of the log is pending
            let window_closed = log_end.is_some_and(|end| end > deadline);
            let sealed = events[i].seal.is_some()
                || seal_times.iter().any(|&t| t >= modified && t <= deadline);
            window_closed && !sealed
        })
        .collect();

    if unsealed.is_empty() {
        return Vec::new();
    }
    vec![Finding {
        description: format!(
            "Missing ledger seal: {} modifications not sealed within {}s",
            unsealed.len(),
            config.seal_sla_secs
        ),
        event_ids: ids(events, &unsealed),
    }]
}

fn out_of_order(events: &[ForensicEvent]) -> Vec<Finding> {
    events
        .windows(2)
        .filter(|pair| pair[1].timestamp < pair[0].timestamp)
        .map(|pair| Finding {
            description: format!(
                "Out-of-order event {}: {} precedes predecessor {} ({})",
                pair[1].event_id,
                pair[1].timestamp.format("%Y-%m-%d %H:%M:%S"),
                pair[0].event_id,
                pair[0].timestamp.format("%Y-%m-%d %H:%M:%S")
            ),
            event_ids: vec![pair[0].event_id.clone(), pair[1].event_id.clone()],
        })
        .collect()
}

fn actor_dominance(
    builder: &TimelineBuilder,
    events: &[ForensicEvent],
    categories: &[EventCategory],
) -> Vec<Finding> {
    let config = builder.config();
    let modifications = indices_in(categories, EventCategory::Modification);
    if modifications.len() < config.dominance_min_modifications.max(1) {
        return Vec::new();
    }

    let mut by_actor: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for &i in &modifications {
        if let Some(actor) = events[i].actor.as_deref() {
            by_actor.entry(actor).or_default().push(i);
        }
    }
    // Alphabetically first actor wins ties
    let Some((actor, owned)) = by_actor
        .iter()
        .max_by(|a, b| a.1.len().cmp(&b.1.len()).then_with(|| b.0.cmp(a.0)))
    else {
        return Vec::new();
    };

    let share = owned.len() as f64 / modifications.len() as f64;
    if share <= config.dominance_ratio {
        return Vec::new();
    }
    vec![Finding {
        description: format!(
            "Single-actor dominance: {} made {} of {} modifications ({:.0}%)",
            actor,
            owned.len(),
            modifications.len(),
            share * 100.0
        ),
        event_ids: ids(events, owned),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimelineConfig;
    use crate::timeline::tests::at;

    fn scan(events: &[ForensicEvent]) -> Vec<TemporalAnomaly> {
        scan_with(TimelineConfig::default(), events)
    }

    fn scan_with(config: TimelineConfig, events: &[ForensicEvent]) -> Vec<TemporalAnomaly> {
        let builder = TimelineBuilder::new(config);
        let categories: Vec<_> = events.iter().map(|e| builder.categorize(e)).collect();
        run_all(&builder, events, &categories)
    }

    fn kinds(anomalies: &[TemporalAnomaly]) -> Vec<AnomalyKind> {
        anomalies.iter().map(|a| a.kind).collect()
    }

    fn modified(id: &str, h: u32, m: u32, s: u32) -> ForensicEvent {
        ForensicEvent::new(id, at(h, m, s), "field_updated").with_actor("alice")
    }

    fn sealed(id: &str, h: u32, m: u32) -> ForensicEvent {
        ForensicEvent::new(id, at(h, m, 0), "hash_sealed").with_seal(format!("h-{}", id), at(h, m, 0))
    }

    #[test]
    fn test_rapid_modifications() {
        let events = vec![
            modified("m1", 10, 0, 0),
            modified("m2", 10, 1, 0),
            modified("m3", 10, 2, 0),
            sealed("s1", 10, 3),
        ];
        let anomalies = scan(&events);
        assert_eq!(kinds(&anomalies), vec![AnomalyKind::RapidModifications]);
        assert_eq!(anomalies[0].event_ids, vec!["m1", "m2", "m3"]);
        assert_eq!(anomalies[0].contribution, 0.25);
    }

    #[test]
    fn test_spread_out_modifications_are_not_rapid() {
        let events = vec![
            modified("m1", 10, 0, 0),
            sealed("s1", 10, 1),
            modified("m2", 10, 10, 0),
            sealed("s2", 10, 11),
            modified("m3", 10, 20, 0),
            sealed("s3", 10, 21),
        ];
        assert!(scan(&events).is_empty());
    }

    #[test]
    fn test_off_hours_respects_offset() {
        let events = vec![ForensicEvent::new("v1", at(3, 0, 0), "document_viewed")];
        assert_eq!(kinds(&scan(&events)), vec![AnomalyKind::OffHoursAccess]);

        // 03:00 UTC is 12:00 at UTC+9
        let config = TimelineConfig {
            utc_offset_minutes: 9 * 60,
            ..TimelineConfig::default()
        };
        assert!(scan_with(config, &events).is_empty());
    }

    #[test]
    fn test_failure_cluster() {
        let events = vec![
            ForensicEvent::new("f1", at(9, 0, 0), "login_failed"),
            ForensicEvent::new("f2", at(9, 1, 0), "login_failed"),
            ForensicEvent::new("f3", at(9, 2, 0), "access_denied"),
        ];
        let anomalies = scan(&events);
        assert_eq!(kinds(&anomalies), vec![AnomalyKind::FailureCluster]);
        assert_eq!(anomalies[0].event_ids.len(), 3);
    }

    #[test]
    fn test_missing_seal_only_after_sla_elapses() {
        let pending = vec![modified("m1", 9, 0, 0), ForensicEvent::new("v1", at(9, 30, 0), "document_viewed")];
        assert!(scan(&pending).is_empty());

        let overdue = vec![modified("m1", 9, 0, 0), ForensicEvent::new("v1", at(11, 0, 0), "document_viewed")];
        let anomalies = scan(&overdue);
        assert_eq!(kinds(&anomalies), vec![AnomalyKind::MissingSeal]);
        assert_eq!(anomalies[0].event_ids, vec!["m1"]);
    }

    #[test]
    fn test_out_of_order() {
        let events = vec![
            ForensicEvent::new("a", at(10, 0, 0), "document_viewed"),
            ForensicEvent::new("b", at(9, 0, 0), "document_viewed"),
            ForensicEvent::new("c", at(11, 0, 0), "document_viewed"),
        ];
        let anomalies = scan(&events);
        assert_eq!(kinds(&anomalies), vec![AnomalyKind::OutOfOrder]);
        assert_eq!(anomalies[0].event_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_actor_dominance() {
        let mut events = Vec::new();
        for (i, actor) in ["alice", "alice", "alice", "alice", "alice", "bob"].iter().enumerate() {
            let minute = (i as u32) * 10;
            events.push(modified(&format!("m{}", i), 9, minute, 0).with_actor(*actor));
            events.push(sealed(&format!("s{}", i), 9, minute + 1));
        }
        // 5 of 6 is 83%, above the 80% default
        let anomalies = scan(&events);
        assert_eq!(kinds(&anomalies), vec![AnomalyKind::ActorDominance]);
        assert!(anomalies[0].description.contains("alice made 5 of 6"));
    }
}
