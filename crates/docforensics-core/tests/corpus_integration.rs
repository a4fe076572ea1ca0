//! Corpus pattern mining end to end

use chrono::{DateTime, Duration, TimeZone, Utc};
use docforensics_core::{
    AmountEdit, CorpusEntry, DocumentNode, EngineConfig, ForensicEngine, ForensicEvent, Pattern,
    PatternType, Severity,
};
use serde_json::json;

fn engine() -> ForensicEngine {
    ForensicEngine::new(EngineConfig::default()).unwrap()
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
}

/// Alternates between two layouts so no template group forms by accident
fn entry(id: &str, i: usize) -> CorpusEntry {
    let fields = if i % 2 == 0 {
        json!({"applicant": {"full_name": format!("Applicant {}", id)}, "loan_amount": 100_000 + i})
    } else {
        json!({"borrower_name": format!("Applicant {}", id), "requested": {"principal": 90_000 + i}})
    };
    CorpusEntry::new(id, DocumentNode::from(fields))
}

fn of_type(patterns: &[Pattern], pattern_type: PatternType) -> Vec<&Pattern> {
    patterns.iter().filter(|p| p.pattern_type == pattern_type).collect()
}

fn book() -> Vec<CorpusEntry> {
    let mut corpus: Vec<CorpusEntry> = (0..5).map(|i| entry(&format!("doc-{}", i), i)).collect();

    corpus[1].signature_hash = Some("sig-A".to_string());
    corpus[3].signature_hash = Some("SIG-a ".to_string());

    let mut shared_ssn = entry("ssn-1", 0);
    shared_ssn.fields = DocumentNode::from(json!({"ssn": "555-66-7777", "name": "Carl"}));
    shared_ssn.borrower_id = Some("carl".to_string());
    let mut shared_ssn_2 = entry("ssn-2", 1);
    shared_ssn_2.fields = DocumentNode::from(json!({"ssn": "555667777", "name": "Cora"}));
    shared_ssn_2.borrower_id = Some("cora".to_string());
    corpus.push(shared_ssn);
    corpus.push(shared_ssn_2);

    for i in 0..5 {
        let mut e = entry(&format!("touched-{}", i), i);
        e.events = vec![ForensicEvent::new(
            format!("touched-{}-m", i),
            base() + Duration::minutes(i as i64 * 3),
            "document_modified",
        )
        .with_actor("ops-3")];
        corpus.push(e);
    }

    for i in 0..3 {
        let mut e = entry(&format!("inflated-{}", i), i);
        e.submitter = Some("broker-9".to_string());
        e.amount_edits = vec![AmountEdit {
            field: "loan_amount".to_string(),
            old_value: 100_000.0,
            new_value: 180_000.0,
            percent_delta: Some(80.0),
            edited_at: None,
        }];
        corpus.push(e);
    }
    corpus
}

#[test]
fn test_shared_signature_reported_once() {
    let mut corpus: Vec<CorpusEntry> = (0..5).map(|i| entry(&format!("d{}", i), i)).collect();
    corpus[0].signature_hash = Some("f00d".to_string());
    corpus[4].signature_hash = Some("f00d".to_string());
    corpus[2].signature_hash = Some("beef".to_string());

    let patterns = engine().detect_patterns(&corpus).unwrap();
    let duplicates = of_type(&patterns, PatternType::DuplicateSignature);
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].affected_documents, vec!["d0", "d4"]);
    assert_eq!(duplicates[0].severity, Severity::Critical);
}

#[test]
fn test_six_submissions_in_under_three_minutes() {
    let corpus: Vec<CorpusEntry> = (0..6)
        .map(|i| {
            let mut e = entry(&format!("s{}", i), i);
            e.submitter = Some("broker-17".to_string());
            e.submitted_at = Some(base() + Duration::seconds(i as i64 * 29));
            e
        })
        .collect();

    let patterns = engine().detect_patterns(&corpus).unwrap();
    let rapid = of_type(&patterns, PatternType::RapidSubmissions);
    assert_eq!(rapid.len(), 1);
    assert_eq!(rapid[0].evidence["submission_count"], 6);
    assert_eq!(rapid[0].affected_documents.len(), 6);
}

#[test]
fn test_book_scan_finds_each_scheme() {
    let report = engine().mine(&book()).unwrap();
    let patterns = &report.patterns;

    assert_eq!(of_type(patterns, PatternType::DuplicateSignature).len(), 1);
    assert_eq!(of_type(patterns, PatternType::IdentityReuse).len(), 1);
    assert_eq!(of_type(patterns, PatternType::CoordinatedTampering).len(), 1);
    assert_eq!(of_type(patterns, PatternType::AmountManipulation).len(), 1);
    assert!(of_type(patterns, PatternType::RapidSubmissions).is_empty());

    let reuse = of_type(patterns, PatternType::IdentityReuse)[0];
    assert_eq!(reuse.affected_documents, vec!["ssn-1", "ssn-2"]);
    assert!(!reuse.evidence.values().any(|v| v.to_string().contains("555667777")));

    assert_eq!(patterns[0].pattern_type, PatternType::DuplicateSignature);
    assert!(patterns.windows(2).all(|w| w[0].risk_score >= w[1].risk_score));
    assert!(report.summary.requires_escalation);
    assert_eq!(report.summary.highest_severity, Some(Severity::Critical));
    assert_eq!(report.summary.documents_scanned, 15);
}

#[test]
fn test_corpus_order_does_not_change_findings() {
    let engine = engine();
    let project = |patterns: Vec<Pattern>| -> Vec<(PatternType, Vec<String>, String)> {
        patterns
            .into_iter()
            .map(|p| (p.pattern_type, p.affected_documents, format!("{:.4}", p.risk_score)))
            .collect()
    };

    let forward = engine.detect_patterns(&book()).unwrap();
    let mut reversed = book();
    reversed.reverse();
    let backward = engine.detect_patterns(&reversed).unwrap();
    assert_eq!(project(forward), project(backward));
}

#[test]
fn test_empty_corpus_yields_no_patterns() {
    let report = engine().mine(&[]).unwrap();
    assert!(report.patterns.is_empty());
    assert!(!report.summary.requires_escalation);
}

#[test]
fn test_duplicate_document_ids_rejected() {
    let corpus = vec![entry("same", 0), entry("same", 1)];
    let err = engine().detect_patterns(&corpus).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_corpus_loads_from_json() {
    let corpus: Vec<CorpusEntry> = serde_json::from_str(
        r#"[
            {"document_id": "a", "fields": {"loan_amount": 1}, "signature_hash": "x"},
            {"document_id": "b", "fields": {"principal": 2}, "signature_hash": "x",
             "submitter": "broker", "submitted_at": "2024-03-05T10:00:00Z"}
        ]"#,
    )
    .unwrap();
    let report = engine().mine(&corpus).unwrap();
    assert_eq!(report.summary.total_patterns, 1);
    assert_eq!(report.patterns[0].pattern_type, PatternType::DuplicateSignature);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["patterns"][0]["pattern_type"], "duplicate_signature");
}
