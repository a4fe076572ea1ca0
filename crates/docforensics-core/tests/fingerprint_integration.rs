//! Fingerprinting and similarity search across a small document pool

use docforensics_core::{
    CandidateFingerprint, DocumentNode, EngineConfig, ForensicEngine, HashAlgorithm,
};
use serde_json::{json, Value};

fn engine() -> ForensicEngine {
    ForensicEngine::new(EngineConfig::default()).unwrap()
}

fn paystub(name: &str, salary: &str, employer: &str) -> Value {
    json!({
        "employee": {"full_name": name, "email": format!("{}@example.com", name.to_lowercase().replace(' ', "."))},
        "employer": employer,
        "pay_period": "2024-02-15",
        "gross_salary": salary,
        "deductions": [{"code": "FED", "amount": "$412.00"}, {"code": "FICA", "amount": "$198.50"}]
    })
}

fn candidates(engine: &ForensicEngine, docs: &[(&str, Value)]) -> Vec<CandidateFingerprint> {
    docs.iter()
        .map(|(id, value)| CandidateFingerprint {
            document_id: id.to_string(),
            fingerprint: engine.fingerprint(&DocumentNode::from(value.clone())).unwrap(),
        })
        .collect()
}

#[test]
fn test_same_document_gives_same_fingerprint() {
    let engine = engine();
    let doc = DocumentNode::from(paystub("Dana Whitfield", "$7,041.67", "Northwind"));
    assert_eq!(engine.fingerprint(&doc).unwrap(), engine.fingerprint(&doc).unwrap());
}

#[test]
fn test_key_order_does_not_matter() {
    let engine = engine();
    let a: Value = serde_json::from_str(r#"{"a": 1, "b": {"c": "x", "d": "y"}}"#).unwrap();
    let b: Value = serde_json::from_str(r#"{"b": {"d": "y", "c": "x"}, "a": 1}"#).unwrap();
    assert_eq!(
        engine.fingerprint(&DocumentNode::from(a)).unwrap().combined_hash,
        engine.fingerprint(&DocumentNode::from(b)).unwrap().combined_hash
    );
}

#[test]
fn test_duplicate_exactly_when_combined_hashes_match() {
    let engine = engine();
    let target = engine
        .fingerprint(&DocumentNode::from(paystub("Dana Whitfield", "$7,041.67", "Northwind")))
        .unwrap();
    let pool = candidates(
        &engine,
        &[
            ("copy", paystub("Dana Whitfield", "$7,041.67", "Northwind")),
            ("refilled", paystub("Sam Ortega", "$5,210.00", "Contoso")),
            ("unrelated", json!({"property": {"street": "12 Elm", "appraised_value": 410000}})),
        ],
    );

    let results = engine.find_similar(&target, &pool, 0.0).unwrap();
    assert_eq!(results.len(), 3);
    for result in &results {
        let candidate = pool.iter().find(|c| c.document_id == result.document_id).unwrap();
        assert_eq!(
            result.is_duplicate,
            candidate.fingerprint.combined_hash == target.combined_hash
        );
        for score in [
            result.overall_similarity,
            result.structural_similarity,
            result.content_similarity,
            result.style_similarity,
            result.semantic_similarity,
            result.confidence,
        ] {
            assert!((0.0..=1.0).contains(&score));
        }
    }

    assert_eq!(results[0].document_id, "copy");
    assert_eq!(results[0].overall_similarity, 1.0);
    assert!(results[0].matching_patterns.contains(&"exact_duplicate".to_string()));
    assert_eq!(results[2].document_id, "unrelated");
}

#[test]
fn test_refilled_template_is_derivative() {
    let engine = engine();
    let target = engine
        .fingerprint(&DocumentNode::from(paystub("Dana Whitfield", "$7,041.67", "Northwind")))
        .unwrap();
    let refilled = engine
        .fingerprint(&DocumentNode::from(paystub("Sam Ortega", "$5,210.00", "Contoso")))
        .unwrap();
    assert_eq!(target.structural_hash, refilled.structural_hash);

    let result = engine.similarity(&target, &refilled, "refilled");
    assert!(!result.is_duplicate);
    assert_eq!(result.structural_similarity, 1.0);
    assert!(result.matching_patterns.contains(&"identical_structure".to_string()));
}

#[test]
fn test_threshold_filters_and_validates() {
    let engine = engine();
    let target = engine
        .fingerprint(&DocumentNode::from(paystub("Dana Whitfield", "$7,041.67", "Northwind")))
        .unwrap();
    let pool = candidates(
        &engine,
        &[("unrelated", json!({"property": {"street": "12 Elm", "appraised_value": 410000}}))],
    );
    assert!(engine.find_similar(&target, &pool, 0.95).unwrap().is_empty());
    assert!(engine.find_similar(&target, &pool, 1.5).unwrap_err().is_validation());
    assert!(engine.find_similar(&target, &[], 0.5).unwrap().is_empty());
}

#[test]
fn test_configured_algorithm_changes_digest_length() {
    let mut config = EngineConfig::default();
    config.fingerprint.hash_algorithm = HashAlgorithm::Md5;
    let md5 = ForensicEngine::new(config).unwrap();
    let fp = md5.fingerprint(&DocumentNode::from(json!({"a": 1}))).unwrap();
    assert_eq!(fp.algorithm, HashAlgorithm::Md5);
    assert_eq!(fp.combined_hash.len(), 32);

    let sha = engine().fingerprint(&DocumentNode::from(json!({"a": 1}))).unwrap();
    assert_eq!(sha.combined_hash.len(), 64);
}
