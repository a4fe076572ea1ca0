/// Corpus scan over a small synthetic book of loan applications
use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use docforensics_core::{AmountEdit, CorpusEntry, DocumentNode, EngineConfig, ForensicEngine, ForensicEvent};
use serde_json::json;

fn application(id: &str, name: &str, ssn: &str, amount: u64) -> CorpusEntry {
    CorpusEntry::new(
        id,
        DocumentNode::from(json!({
            "borrower": {"full_name": name, "ssn": ssn},
            "loan_amount": amount,
            "purpose": "purchase"
        })),
    )
}

fn main() -> Result<()> {
    println!("🔍 Corpus Pattern Mining Demo\n");

    let engine = ForensicEngine::new(EngineConfig::default())?;
    let base = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).single().unwrap_or_else(Utc::now);
    let mut corpus = Vec::new();

    // Scenario 1: one signature image pasted onto two applications
    for (i, (name, ssn)) in [("Ana Ruiz", "111-22-3333"), ("Ben Cole", "222-33-4444")]
        .iter()
        .enumerate()
    {
        let mut entry = application(&format!("sig-{}", i), name, ssn, 180_000);
        entry.signature_hash = Some("a41f09c2".to_string());
        entry.borrower_id = Some(format!("B-{}", i));
        corpus.push(entry);
    }

    // Scenario 2: one SSN behind two different borrowers
    for (i, name) in ["Carl Diaz", "Cora Diaz"].iter().enumerate() {
        let mut entry = application(&format!("id-{}", i), name, "555-66-7777", 90_000);
        entry.borrower_id = Some(format!("C-{}", i));
        corpus.push(entry);
    }

    // Scenario 3: a broker pushing six files through in under three minutes,
    // with the amounts inflated on every one
    for i in 0..6 {
        let mut entry = application(&format!("bot-{}", i), &format!("Applicant {}", i), &format!("900-00-{:04}", i), 300_000);
        entry.submitter = Some("broker-17".to_string());
        entry.submitted_at = Some(base + Duration::seconds(i * 29));
        entry.amount_edits = vec![AmountEdit {
            field: "loan_amount".to_string(),
            old_value: 200_000.0,
            new_value: 300_000.0,
            percent_delta: Some(50.0),
            edited_at: None,
        }
        .at(base + Duration::seconds(i * 29 + 5))];
        entry.events = vec![ForensicEvent::new(
            format!("bot-{}-m", i),
            base + Duration::minutes(i * 4),
            "document_modified",
        )
        .with_actor("ops-3")];
        corpus.push(entry);
    }

    let report = engine.mine(&corpus)?;
    println!("✅ Scanned {} documents", report.summary.documents_scanned);
    println!("📈 Patterns: {}", report.summary.total_patterns);
    for pattern in &report.patterns {
        println!(
            "   [{}] {}: {} ({} documents)",
            pattern.severity,
            pattern.pattern_type,
            pattern.description,
            pattern.affected_documents.len()
        );
    }
    if report.summary.requires_escalation {
        println!("\n⚠️  Escalation required");
    }

    println!("\n{}", report.to_json()?);
    Ok(())
}
