/// Fingerprint similarity
///
/// Layers are compared by Jaccard similarity of their shingle sets and
/// combined with the configured layer weights. Duplicate means identical
/// combined hashes; derivative means same skeleton and styling with
/// substantially different content.
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::FingerprintConfig;
use crate::error::EngineError;
use crate::fingerprint::Fingerprint;
use crate::scoring::{round4, weighted_score, ScoreFactor};
use crate::tree::FieldPath;

/// A stored fingerprint to search against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFingerprint {
    pub document_id: String,
    pub fingerprint: Fingerprint,
}

/// Comparison of a target fingerprint with one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub document_id: String,
    pub overall_similarity: f64,
    pub structural_similarity: f64,
    pub content_similarity: f64,
    pub style_similarity: f64,
    pub semantic_similarity: f64,
    pub matching_patterns: Vec<String>,
    pub is_derivative: bool,
    pub is_duplicate: bool,
    pub confidence: f64,
}

/// Jaccard similarity; two empty sets are identical
pub fn jaccard(a: &BTreeSet<u32>, b: &BTreeSet<u32>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

fn shares_any(a: &[String], b: &[String]) -> bool {
    a.iter().any(|item| b.contains(item))
}

/// Compare two fingerprints
pub fn compare(
    config: &FingerprintConfig,
    target: &Fingerprint,
    candidate: &Fingerprint,
    document_id: &str,
) -> SimilarityResult {
    let structural = round4(jaccard(&target.layers.structural, &candidate.layers.structural));
    let content = round4(jaccard(&target.layers.content, &candidate.layers.content));
    let style = round4(jaccard(&target.layers.style, &candidate.layers.style));
    let semantic = round4(jaccard(&target.layers.semantic, &candidate.layers.semantic));

    let weights = &config.layer_weights;
    let overall = round4(weighted_score(&[
        ScoreFactor::new("structural", structural, weights.structural),
        ScoreFactor::new("content", content, weights.content),
        ScoreFactor::new("style", style, weights.style),
        ScoreFactor::new("semantic", semantic, weights.semantic),
    ]));

    let is_duplicate = target.combined_hash == candidate.combined_hash;
    let is_derivative = !is_duplicate
        && structural >= config.derivative_structural_min
        && style >= config.derivative_style_min
        && content < config.derivative_content_max;

    let mut matching_patterns = Vec::new();
    if is_duplicate {
        matching_patterns.push("exact_duplicate".to_string());
    }
    if target.structural_hash == candidate.structural_hash {
        matching_patterns.push("identical_structure".to_string());
    } else if structural >= config.derivative_structural_min {
        matching_patterns.push("similar_structure".to_string());
    }
    if target.content_hash == candidate.content_hash {
        matching_patterns.push("identical_content".to_string());
    } else if content >= config.derivative_content_max {
        matching_patterns.push("similar_content".to_string());
    }
    if target.style_hash == candidate.style_hash {
        matching_patterns.push("matching_style".to_string());
    }
    if shares_any(&target.keywords, &candidate.keywords) {
        matching_patterns.push("shared_keywords".to_string());
    }
    if shares_any(&target.entities.identity, &candidate.entities.identity) {
        matching_patterns.push("shared_identity_entities".to_string());
    }
    if shares_any(&target.entities.financial, &candidate.entities.financial) {
        matching_patterns.push("shared_financial_amounts".to_string());
    }
    if is_derivative {
        matching_patterns.push("template_derivative".to_string());
    }

    // Scores near 0.5 are the least decisive; tiny documents carry little signal
    let decisiveness = ((overall - 0.5).abs() * 2.0).min(1.0);
    let smallest = target.field_count.min(candidate.field_count) as f64;
    let size = if config.small_document_fields == 0 {
        1.0
    } else {
        (smallest / config.small_document_fields as f64).min(1.0)
    };
    let confidence = round4(weighted_score(&[
        ScoreFactor::new("decisiveness", decisiveness, 0.6),
        ScoreFactor::new("document_size", size, 0.4),
    ]));

    SimilarityResult {
        document_id: document_id.to_string(),
        overall_similarity: overall,
        structural_similarity: structural,
        content_similarity: content,
        style_similarity: style,
        semantic_similarity: semantic,
        matching_patterns,
        is_derivative,
        is_duplicate,
        confidence,
    }
}

/// Candidates at or above `threshold`, most similar first
pub fn find_similar(
    config: &FingerprintConfig,
    target: &Fingerprint,
    candidates: &[CandidateFingerprint],
    threshold: f64,
) -> Result<Vec<SimilarityResult>, EngineError> {
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(EngineError::validation(
            &FieldPath::root().key("threshold"),
            format!("threshold must be within [0, 1], got {}", threshold),
        ));
    }

    let mut matches: Vec<SimilarityResult> = candidates
        .par_iter()
        .map(|candidate| compare(config, target, &candidate.fingerprint, &candidate.document_id))
        .filter(|result| result.overall_similarity >= threshold)
        .collect();

    matches.sort_by(|a, b| {
        b.overall_similarity
            .total_cmp(&a.overall_similarity)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });

    debug!(
        candidates = candidates.len(),
        matches = matches.len(),
        threshold,
        "Similarity search complete"
    );
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FingerprintGenerator;
    use crate::tree::DocumentNode;
    use serde_json::json;

    fn fingerprint(value: serde_json::Value) -> Fingerprint {
        FingerprintGenerator::new(FingerprintConfig::default())
            .unwrap()
            .generate(&DocumentNode::from(value))
            .unwrap()
    }

    fn loan(name: &str, amount: u64, purpose: &str) -> serde_json::Value {
        json!({
            "borrower_name": name,
            "loan_amount": amount,
            "property_address": format!("{} Main Street", amount % 97),
            "purpose": purpose,
            "term_months": 360,
            "employer": format!("{} Holdings", name),
        })
    }

    #[test]
    fn test_jaccard_edges() {
        let empty = BTreeSet::new();
        let a: BTreeSet<u32> = [1, 2, 3].into_iter().collect();
        let b: BTreeSet<u32> = [3, 4].into_iter().collect();
        assert_eq!(jaccard(&empty, &empty), 1.0);
        assert_eq!(jaccard(&a, &empty), 0.0);
        assert_eq!(jaccard(&a, &b), 0.25);
    }

    #[test]
    fn test_self_comparison_is_duplicate() {
        let config = FingerprintConfig::default();
        let fp = fingerprint(loan("Ada", 250_000, "refinance"));
        let result = compare(&config, &fp, &fp, "self");
        assert!(result.is_duplicate);
        assert!(!result.is_derivative);
        assert_eq!(result.overall_similarity, 1.0);
        assert!(result.matching_patterns.contains(&"exact_duplicate".to_string()));
    }

    #[test]
    fn test_same_template_different_data_is_derivative() {
        let config = FingerprintConfig::default();
        let a = fingerprint(loan("Ada", 250_000, "refinance"));
        let b = fingerprint(loan("Grace", 410_000, "purchase"));
        let result = compare(&config, &a, &b, "b");
        assert!(!result.is_duplicate);
        assert_eq!(result.structural_similarity, 1.0);
        assert!(result.is_derivative);
        assert!(result.matching_patterns.contains(&"template_derivative".to_string()));
    }

    #[test]
    fn test_find_similar_filters_and_orders() {
        let config = FingerprintConfig::default();
        let target = fingerprint(loan("Ada", 250_000, "refinance"));
        let candidates = vec![
            CandidateFingerprint {
                document_id: "unrelated".into(),
                fingerprint: fingerprint(json!({"Colour": "RED", "Items": [1, 2, 3]})),
            },
            CandidateFingerprint {
                document_id: "copy".into(),
                fingerprint: target.clone(),
            },
            CandidateFingerprint {
                document_id: "sibling".into(),
                fingerprint: fingerprint(loan("Grace", 410_000, "purchase")),
            },
        ];

        let all = find_similar(&config, &target, &candidates, 0.0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].document_id, "copy");
        assert_eq!(all[1].document_id, "sibling");
        assert!(all.windows(2).all(|w| w[0].overall_similarity >= w[1].overall_similarity));

        let strict = find_similar(&config, &target, &candidates, 0.99).unwrap();
        assert_eq!(strict.len(), 1);
        assert!(find_similar(&config, &target, &candidates, 1.5).is_err());
    }
}
