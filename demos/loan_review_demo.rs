/// Single-application review: diff two snapshots, fingerprint them and
/// reconstruct the document's event history
use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use docforensics_core::{
    AmountEdit, CandidateFingerprint, DocumentNode, EngineConfig, ForensicEngine, ForensicEvent,
};
use serde_json::json;

fn main() -> Result<()> {
    println!("🔍 Loan Application Review Demo\n");

    let engine = ForensicEngine::new(EngineConfig::default())?;

    let submitted = DocumentNode::from(json!({
        "application_id": "APP-2024-0117",
        "borrower": {
            "full_name": "Dana Whitfield",
            "ssn": "123-45-6789",
            "email": "dana.whitfield@example.com"
        },
        "loan": {"loan_amount": 250000, "interest_rate": 6.25, "term_months": 360},
        "income": {"annual_salary": "$84,500.00", "employer": "Northwind Logistics"},
        "signature": {"signed_by": "Dana Whitfield", "signed_on": "2024-03-01"}
    }));

    // Same application after an unexplained edit pass
    let revised = DocumentNode::from(json!({
        "application_id": "APP-2024-0117",
        "borrower": {
            "full_name": "Dana Whitfield",
            "ssn": "123-45-6780",
            "email": "dana.whitfield@example.com"
        },
        "loan": {"loan_amount": 500000, "interest_rate": 6.25, "term_months": 360},
        "income": {"annual_salary": "$184,500.00", "employer": "Northwind Logistics"},
        "signature": {"signed_by": "D. Whitfield", "signed_on": "2024-03-01"}
    }));

    // Scenario 1: structural diff
    let diff = engine.compare(&submitted, &revised)?;
    println!("📊 Diff");
    println!("   Similarity: {:.1}%", diff.overall_similarity * 100.0);
    println!("   Risk:       {} ({:.2})", diff.risk_level, diff.risk_score);
    for change in &diff.changes {
        println!("   {:?} {} [{}]", change.change_type, change.path, change.category);
    }
    for pattern in &diff.suspicious_patterns {
        println!("   ⚠️  {}", pattern);
    }
    println!("   ➡️  {}\n", diff.recommendation);

    let edits: Vec<AmountEdit> = diff.changes.iter().filter_map(AmountEdit::from_change).collect();
    println!("💰 {} financial edits recorded for corpus mining\n", edits.len());

    // Scenario 2: the revision keeps the original's shape
    let original_fp = engine.fingerprint(&submitted)?;
    let revised_fp = engine.fingerprint(&revised)?;
    let similarity = engine.similarity(&original_fp, &revised_fp, "APP-2024-0117-rev");
    println!("🧬 Fingerprint similarity: {:.1}%", similarity.overall_similarity * 100.0);
    println!("   Matching patterns: {}", similarity.matching_patterns.join(", "));
    let matches = engine.find_similar(
        &original_fp,
        &[CandidateFingerprint {
            document_id: "APP-2024-0117-rev".to_string(),
            fingerprint: revised_fp,
        }],
        0.5,
    )?;
    println!("   Candidates above 50%: {}\n", matches.len());

    // Scenario 3: the edit pass happened late at night, unsealed and in a burst
    let base = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).single().unwrap_or_else(Utc::now);
    let night = base + Duration::hours(14);
    let events = vec![
        ForensicEvent::new("e1", base, "document_uploaded").with_actor("dana"),
        ForensicEvent::new("e2", base + Duration::minutes(2), "hash_sealed")
            .with_seal("9f2c1a", base + Duration::minutes(2)),
        ForensicEvent::new("e3", night, "login_failed").with_actor("ops-7"),
        ForensicEvent::new("e4", night + Duration::seconds(40), "login_failed").with_actor("ops-7"),
        ForensicEvent::new("e5", night + Duration::seconds(75), "login_failed").with_actor("ops-7"),
        ForensicEvent::new("e6", night + Duration::minutes(3), "field_updated").with_actor("ops-7"),
        ForensicEvent::new("e7", night + Duration::minutes(4), "field_updated").with_actor("ops-7"),
        ForensicEvent::new("e8", night + Duration::minutes(5), "content_edited").with_actor("ops-7"),
        ForensicEvent::new("e9", night + Duration::hours(3), "document_viewed").with_actor("dana"),
    ];

    let timeline = engine.build_timeline("APP-2024-0117", &events)?;
    println!("{}", timeline.to_text_report());

    Ok(())
}
