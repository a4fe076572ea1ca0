/// Multi-layer document fingerprints
///
/// Four independent layers are derived from a document tree:
/// - structural: key names, branching and nesting, values discarded
/// - content: canonical leaf values
/// - style: key casing, value formats, key length
/// - semantic: extracted keywords and entities
///
/// Each layer keeps a hex digest for exact matching and a shingle set for
/// Jaccard similarity. The combined hash covers all four digests.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::config::FingerprintConfig;
use crate::error::{ConfigError, EngineError};
use crate::tree::{DocumentNode, FieldPath};

pub mod hashing;
pub mod similarity;
pub mod text;

pub use hashing::HashAlgorithm;
pub use similarity::{CandidateFingerprint, SimilarityResult};
pub use text::EntitySet;

use hashing::{hash_tokens, shingles};
use text::{extract_keywords, key_case, EntityExtractor};

/// Shingle sets per layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerShingles {
    pub structural: BTreeSet<u32>,
    pub content: BTreeSet<u32>,
    pub style: BTreeSet<u32>,
    pub semantic: BTreeSet<u32>,
}

/// Fingerprint of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub structural_hash: String,
    pub content_hash: String,
    pub style_hash: String,
    pub semantic_hash: String,
    pub combined_hash: String,
    pub algorithm: HashAlgorithm,
    pub field_count: usize,
    pub nested_depth: usize,
    pub keywords: Vec<String>,
    pub entities: EntitySet,
    pub layers: LayerShingles,
}

impl Fingerprint {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Builds fingerprints under one configuration
#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    config: FingerprintConfig,
    extractor: EntityExtractor,
    stopwords: HashSet<String>,
}

impl FingerprintGenerator {
    pub fn new(config: FingerprintConfig) -> Result<Self, ConfigError> {
        let stopwords = config.stopwords.iter().map(|w| w.to_lowercase()).collect();
        Ok(Self {
            extractor: EntityExtractor::new()?,
            stopwords,
            config,
        })
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Fingerprint a document tree
    ///
    /// The result depends only on the tree's content, never on map insertion
    /// order or the time of the call.
    pub fn generate(&self, tree: &DocumentNode) -> Result<Fingerprint, EngineError> {
        if tree.as_map().is_none() {
            return Err(EngineError::validation(
                &FieldPath::root(),
                format!("document root must be a map, found {}", tree.kind()),
            ));
        }

        let leaves = tree.leaves();
        let mut content_tokens = Vec::with_capacity(leaves.len());
        for (path, scalar) in &leaves {
            content_tokens.push(scalar.canonical(path)?);
        }
        content_tokens.sort();

        let structural_tokens = structural_tokens(tree);
        let style_tokens = self.style_tokens(tree);

        let texts: Vec<&str> = leaves
            .iter()
            .filter_map(|(_, scalar)| scalar.as_text())
            .collect();
        let keywords = extract_keywords(
            texts.iter().copied(),
            &self.stopwords,
            self.config.min_keyword_length,
            self.config.min_keyword_frequency,
            self.config.max_keywords,
        );
        let entities = self.extractor.extract(texts.iter().copied());
        let semantic_tokens = semantic_tokens(&keywords, &entities);

        let algorithm = self.config.hash_algorithm;
        let structural_hash = digest(&structural_tokens, algorithm);
        let content_hash = digest(&content_tokens, algorithm);
        let style_hash = digest(&style_tokens, algorithm);
        let semantic_hash = digest(&semantic_tokens, algorithm);
        let combined_hash = hash_tokens(
            [
                structural_hash.as_str(),
                content_hash.as_str(),
                style_hash.as_str(),
                semantic_hash.as_str(),
            ],
            algorithm,
        );

        let layers = LayerShingles {
            structural: shingles(structural_tokens.iter().map(String::as_str)),
            content: shingles(content_tokens.iter().map(String::as_str)),
            style: shingles(style_tokens.iter().map(String::as_str)),
            semantic: shingles(semantic_tokens.iter().map(String::as_str)),
        };

        debug!(
            fields = leaves.len(),
            keywords = keywords.len(),
            combined = %combined_hash,
            "Generated fingerprint"
        );

        Ok(Fingerprint {
            structural_hash,
            content_hash,
            style_hash,
            semantic_hash,
            combined_hash,
            algorithm,
            field_count: leaves.len(),
            nested_depth: tree.depth(),
            keywords,
            entities,
            layers,
        })
    }

    /// Distinct formatting conventions present in the tree
    fn style_tokens(&self, tree: &DocumentNode) -> Vec<String> {
        let mut tokens = BTreeSet::new();
        let mut key_lengths = Vec::new();

        tree.walk(&mut |_, node| match node {
            DocumentNode::Map(map) => {
                for key in map.keys() {
                    tokens.insert(format!("case:{}", key_case(key)));
                    key_lengths.push(key.chars().count());
                }
            }
            DocumentNode::Scalar(scalar) => {
                if let Some(style) = self.extractor.value_style(scalar) {
                    tokens.insert(style);
                }
            }
            DocumentNode::List(_) => {}
        });

        if !key_lengths.is_empty() {
            let mean = key_lengths.iter().sum::<usize>() as f64 / key_lengths.len() as f64;
            // Bucketed so one renamed key does not flip the token
            tokens.insert(format!("keylen:{}", (mean / 4.0).round() as usize));
        }

        tokens.into_iter().collect()
    }
}

fn digest(tokens: &[String], algorithm: HashAlgorithm) -> String {
    hash_tokens(tokens.iter().map(String::as_str), algorithm)
}

/// Shape tokens: generalized path, node kind and branching for every node
fn structural_tokens(tree: &DocumentNode) -> Vec<String> {
    let mut tokens = Vec::new();
    tree.walk(&mut |path, node| {
        let kind = match node {
            DocumentNode::Scalar(_) => "leaf",
            DocumentNode::List(_) => "list",
            DocumentNode::Map(_) => "map",
        };
        let location = if path.is_root() {
            "$".to_string()
        } else {
            path.generalized()
        };
        tokens.push(format!("{}:{}:{}", location, kind, node.branching()));
    });
    tokens.push(format!("depth:{}", tree.depth()));
    tokens.sort();
    tokens
}

fn semantic_tokens(keywords: &[String], entities: &EntitySet) -> Vec<String> {
    let mut tokens: Vec<String> = keywords.iter().map(|k| format!("kw:{}", k)).collect();
    tokens.extend(entities.financial.iter().map(|e| format!("fin:{}", e)));
    tokens.extend(entities.identity.iter().map(|e| format!("id:{}", e)));
    tokens.extend(entities.numbers.iter().map(|e| format!("num:{}", e)));
    tokens.sort();
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn generator() -> FingerprintGenerator {
        FingerprintGenerator::new(FingerprintConfig::default()).unwrap()
    }

    fn doc(value: serde_json::Value) -> DocumentNode {
        DocumentNode::from(value)
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let tree = doc(json!({
            "borrower": {"name": "Ada Lovelace", "ssn": "123-45-6789"},
            "loan_amount": 250000,
            "notes": "Refinance of primary residence, refinance approved"
        }));
        let a = generator().generate(&tree).unwrap();
        let b = generator().generate(&tree).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.combined_hash.len(), 64);
        assert_eq!(a.field_count, 4);
        assert_eq!(a.nested_depth, 2);
        assert!(a.keywords.contains(&"refinance".to_string()));
        assert_eq!(a.entities.identity, vec!["123-45-6789"]);
    }

    #[test]
    fn test_structure_ignores_values() {
        let a = generator()
            .generate(&doc(json!({"name": "Ada", "amount": 100})))
            .unwrap();
        let b = generator()
            .generate(&doc(json!({"name": "Grace", "amount": 900})))
            .unwrap();
        assert_eq!(a.structural_hash, b.structural_hash);
        assert_ne!(a.content_hash, b.content_hash);
        assert_ne!(a.combined_hash, b.combined_hash);
    }

    #[test]
    fn test_content_is_case_and_whitespace_insensitive() {
        let a = generator().generate(&doc(json!({"name": "  ADA "}))).unwrap();
        let b = generator().generate(&doc(json!({"name": "ada"}))).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_style_tracks_key_casing() {
        let a = generator().generate(&doc(json!({"loan_amount": 1}))).unwrap();
        let b = generator().generate(&doc(json!({"loanAmount": 1}))).unwrap();
        assert_ne!(a.style_hash, b.style_hash);
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_non_map_root_rejected() {
        let err = generator().generate(&doc(json!(["a", "b"]))).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_algorithm_follows_config() {
        let config = FingerprintConfig {
            hash_algorithm: HashAlgorithm::Md5,
            ..FingerprintConfig::default()
        };
        let fp = FingerprintGenerator::new(config)
            .unwrap()
            .generate(&doc(json!({"a": 1})))
            .unwrap();
        assert_eq!(fp.combined_hash.len(), 32);
        assert_eq!(fp.algorithm, HashAlgorithm::Md5);
    }
}
