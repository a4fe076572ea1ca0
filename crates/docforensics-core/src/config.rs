/// Engine configuration
///
/// Every rule table and threshold the detectors use lives here so tuning
/// never touches detection code. All sections default to the production
/// constants; a JSON file only needs to name what it overrides.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::diff::ChangeCategory;
use crate::error::ConfigError;
use crate::fingerprint::HashAlgorithm;
use crate::scoring::Severity;
use crate::timeline::EventCategory;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub diff: DiffRules,

    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    #[serde(default)]
    pub timeline: TimelineConfig,

    #[serde(default)]
    pub patterns: PatternConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Range checks on numeric settings; regex rules are checked when compiled
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.diff.weights;
        for (field, value) in [
            ("diff.weights.financial", w.financial),
            ("diff.weights.identity", w.identity),
            ("diff.weights.signature", w.signature),
            ("diff.weights.metadata", w.metadata),
            ("diff.weights.other", w.other),
            ("diff.coordinated_edit_boost", self.diff.coordinated_edit_boost),
            ("patterns.template_fraud.risk_weight", self.patterns.template_fraud.risk_weight),
            ("timeline.investigation_threshold", self.timeline.investigation_threshold),
            ("timeline.dominance_ratio", self.timeline.dominance_ratio),
        ] {
            unit_interval(field, value)?;
        }

        for (field, value) in [
            ("diff.large_delta_multiplier", self.diff.large_delta_multiplier),
            ("diff.moderate_delta_multiplier", self.diff.moderate_delta_multiplier),
            ("diff.round_number_multiplier", self.diff.round_number_multiplier),
        ] {
            if !(value.is_finite() && value >= 1.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("multiplier must be >= 1.0, got {}", value),
                });
            }
        }

        if self.diff.moderate_delta_pct > self.diff.large_delta_pct {
            return Err(ConfigError::InvalidValue {
                field: "diff.moderate_delta_pct",
                message: "must not exceed diff.large_delta_pct".to_string(),
            });
        }

        let t = &self.timeline;
        if t.business_hours_start >= t.business_hours_end || t.business_hours_end > 24 {
            return Err(ConfigError::InvalidValue {
                field: "timeline.business_hours_start",
                message: format!(
                    "business hours window {}..{} is empty or out of range",
                    t.business_hours_start, t.business_hours_end
                ),
            });
        }

        let lw = &self.fingerprint.layer_weights;
        if lw.structural + lw.content + lw.style + lw.semantic <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "fingerprint.layer_weights",
                message: "at least one layer weight must be positive".to_string(),
            });
        }

        Ok(())
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            message: format!("expected a value in [0,1], got {}", value),
        })
    }
}

/// A regex that assigns a change category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: ChangeCategory,
    pub pattern: String,
}

impl CategoryRule {
    fn new(category: ChangeCategory, pattern: &str) -> Self {
        Self {
            category,
            pattern: pattern.to_string(),
        }
    }
}

/// Base risk weight per change category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub financial: f64,
    pub identity: f64,
    pub signature: f64,
    pub metadata: f64,
    pub other: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            financial: 0.9,
            identity: 0.85,
            signature: 1.0,
            metadata: 0.3,
            other: 0.2,
        }
    }
}

impl CategoryWeights {
    pub fn weight(&self, category: ChangeCategory) -> f64 {
        match category {
            ChangeCategory::Financial => self.financial,
            ChangeCategory::Identity => self.identity,
            ChangeCategory::Signature => self.signature,
            ChangeCategory::Metadata => self.metadata,
            ChangeCategory::Other => self.other,
        }
    }
}

/// Structural diff rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffRules {
    /// Field-name rules, first match wins
    pub category_rules: Vec<CategoryRule>,
    /// Value-shape rules applied when no field-name rule matched
    pub value_rules: Vec<CategoryRule>,
    pub weights: CategoryWeights,
    /// Percent change above which the large multiplier applies
    pub large_delta_pct: f64,
    pub large_delta_multiplier: f64,
    pub moderate_delta_pct: f64,
    pub moderate_delta_multiplier: f64,
    /// A value that is a whole multiple of this unit is a round-number artifact
    pub round_number_unit: f64,
    pub round_number_multiplier: f64,
    /// Changes in one category at or above this count trigger the boost
    pub coordinated_edit_count: usize,
    pub coordinated_edit_boost: f64,
    /// Keys tried, in order, to align list elements by identity
    pub identity_keys: Vec<String>,
}

impl Default for DiffRules {
    fn default() -> Self {
        Self {
            category_rules: vec![
                CategoryRule::new(
                    ChangeCategory::Signature,
                    r"signature|signed|signatory|e_?sign|initials|notary",
                ),
                CategoryRule::new(
                    ChangeCategory::Identity,
                    r"ssn|social_?security|(^|_)tin($|_)|tax_?id|(^|_)ein($|_)|passport|driver|licen[cs]e|dob|birth|e_?mail|phone|mobile|first_?name|last_?name|full_?name|^name$|borrower_?name|address|street|city|zip|postal",
                ),
                CategoryRule::new(
                    ChangeCategory::Financial,
                    r"amount|balance|income|salary|wage|payment|price|rate|principal|interest|fee|loan|debt|asset|liabilit|value|total|cost|apr|(^|_)ltv($|_)|(^|_)dti($|_)|deposit|credit",
                ),
                CategoryRule::new(
                    ChangeCategory::Metadata,
                    r"created|modified|updated|timestamp|version|author|producer|creator|(^|_)id$|uuid|format|page|metadata|title|date|checksum",
                ),
            ],
            value_rules: vec![
                CategoryRule::new(ChangeCategory::Identity, r"^\d{3}-\d{2}-\d{4}$"),
                CategoryRule::new(ChangeCategory::Identity, r"^[^@\s]+@[^@\s]+\.[a-z]{2,}$"),
                CategoryRule::new(ChangeCategory::Financial, r"^[$€£]\s?\d[\d,]*(\.\d+)?$"),
            ],
            weights: CategoryWeights::default(),
            large_delta_pct: 50.0,
            large_delta_multiplier: 3.0,
            moderate_delta_pct: 20.0,
            moderate_delta_multiplier: 1.5,
            round_number_unit: 10_000.0,
            round_number_multiplier: 1.25,
            coordinated_edit_count: 3,
            coordinated_edit_boost: 0.1,
            identity_keys: vec![
                "id".to_string(),
                "uuid".to_string(),
                "key".to_string(),
                "code".to_string(),
            ],
        }
    }
}

/// Per-layer weights for overall fingerprint similarity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerWeights {
    pub structural: f64,
    pub content: f64,
    pub style: f64,
    pub semantic: f64,
}

impl Default for LayerWeights {
    fn default() -> Self {
        // Content and semantics dominate; shape alone means template reuse
        Self {
            structural: 0.2,
            content: 0.35,
            style: 0.15,
            semantic: 0.3,
        }
    }
}

/// Fingerprint generation and similarity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub hash_algorithm: HashAlgorithm,
    pub max_keywords: usize,
    pub min_keyword_frequency: usize,
    pub min_keyword_length: usize,
    pub stopwords: Vec<String>,
    pub layer_weights: LayerWeights,
    pub derivative_structural_min: f64,
    pub derivative_style_min: f64,
    pub derivative_content_max: f64,
    /// Documents with fewer leaves than this get a confidence penalty
    pub small_document_fields: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Sha256,
            max_keywords: 20,
            min_keyword_frequency: 1,
            min_keyword_length: 3,
            stopwords: [
                "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had",
                "her", "was", "one", "our", "out", "has", "have", "this", "that", "with", "from",
                "they", "will", "would", "there", "their", "what", "about", "which", "when",
                "were", "been", "into", "than", "then", "them", "these", "some", "such", "only",
                "other", "its", "also", "per", "via", "may", "shall", "upon",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            layer_weights: LayerWeights::default(),
            derivative_structural_min: 0.8,
            derivative_style_min: 0.8,
            derivative_content_max: 0.8,
            small_document_fields: 10,
        }
    }
}

/// Weight each timeline detector contributes when it fires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorWeights {
    pub rapid_modifications: f64,
    pub off_hours_access: f64,
    pub failure_cluster: f64,
    pub missing_seal: f64,
    pub out_of_order: f64,
    pub actor_dominance: f64,
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            rapid_modifications: 0.25,
            off_hours_access: 0.1,
            failure_cluster: 0.3,
            missing_seal: 0.2,
            out_of_order: 0.35,
            actor_dominance: 0.15,
        }
    }
}

/// Timeline reconstruction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Event type → category lookup (keys are lower-case)
    pub event_categories: BTreeMap<String, EventCategory>,
    pub rapid_modification_count: usize,
    pub rapid_modification_window_secs: i64,
    /// Local business hours, [start, end)
    pub business_hours_start: u32,
    pub business_hours_end: u32,
    pub utc_offset_minutes: i32,
    pub weekends_off_hours: bool,
    /// Substrings of an event type that mark a failed attempt
    pub failure_markers: Vec<String>,
    pub failure_cluster_size: usize,
    pub failure_window_secs: i64,
    /// Modifications must be sealed within this many seconds
    pub seal_sla_secs: i64,
    pub require_seals: bool,
    pub dominance_ratio: f64,
    pub dominance_min_modifications: usize,
    pub weights: DetectorWeights,
    pub investigation_threshold: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        let event_categories = [
            ("document_created", EventCategory::Creation),
            ("document_uploaded", EventCategory::Creation),
            ("version_created", EventCategory::Creation),
            ("document_modified", EventCategory::Modification),
            ("field_updated", EventCategory::Modification),
            ("content_edited", EventCategory::Modification),
            ("page_replaced", EventCategory::Modification),
            ("document_deleted", EventCategory::Modification),
            ("document_viewed", EventCategory::Access),
            ("document_downloaded", EventCategory::Access),
            ("document_shared", EventCategory::Access),
            ("hash_sealed", EventCategory::Blockchain),
            ("blockchain_anchor", EventCategory::Blockchain),
            ("seal_verified", EventCategory::Blockchain),
            ("signature_applied", EventCategory::Attestation),
            ("document_attested", EventCategory::Attestation),
            ("notarized", EventCategory::Attestation),
            ("login_failed", EventCategory::Security),
            ("access_denied", EventCategory::Security),
            ("verification_failed", EventCategory::Security),
            ("permission_changed", EventCategory::Security),
            ("integrity_alert", EventCategory::Security),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            event_categories,
            rapid_modification_count: 3,
            rapid_modification_window_secs: 300,
            business_hours_start: 8,
            business_hours_end: 18,
            utc_offset_minutes: 0,
            weekends_off_hours: true,
            failure_markers: ["fail", "denied", "rejected", "invalid", "locked"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            failure_cluster_size: 3,
            failure_window_secs: 600,
            seal_sla_secs: 3600,
            require_seals: true,
            dominance_ratio: 0.8,
            dominance_min_modifications: 5,
            weights: DetectorWeights::default(),
            investigation_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateSignatureConfig {
    pub min_documents: usize,
    pub risk_score: f64,
}

impl Default for DuplicateSignatureConfig {
    fn default() -> Self {
        Self {
            min_documents: 2,
            risk_score: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountManipulationConfig {
    /// Edits needed before the one-direction check applies
    pub min_edits: usize,
    pub large_edit_pct: f64,
    pub min_large_edits: usize,
    pub risk_score: f64,
}

impl Default for AmountManipulationConfig {
    fn default() -> Self {
        Self {
            min_edits: 3,
            large_edit_pct: 50.0,
            min_large_edits: 2,
            risk_score: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityReuseConfig {
    pub min_borrowers: usize,
    pub risk_score: f64,
    pub ssn_field_pattern: String,
    pub email_field_pattern: String,
}

impl Default for IdentityReuseConfig {
    fn default() -> Self {
        Self {
            min_borrowers: 2,
            risk_score: 0.9,
            ssn_field_pattern: r"ssn|social_?security|tax_?id".to_string(),
            email_field_pattern: r"e_?mail".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatedTamperingConfig {
    pub min_documents: usize,
    pub window_secs: i64,
    pub risk_score: f64,
}

impl Default for CoordinatedTamperingConfig {
    fn default() -> Self {
        Self {
            min_documents: 5,
            window_secs: 3600,
            risk_score: 0.85,
        }
    }
}

/// Shared templates are common in legitimate lending, so both the severity
/// and the risk weight are policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateFraudConfig {
    pub min_group_size: usize,
    pub severity: Severity,
    pub risk_weight: f64,
}

impl Default for TemplateFraudConfig {
    fn default() -> Self {
        Self {
            min_group_size: 5,
            severity: Severity::Medium,
            risk_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RapidSubmissionsConfig {
    pub min_submissions: usize,
    pub max_mean_interval_secs: f64,
    pub risk_score: f64,
}

impl Default for RapidSubmissionsConfig {
    fn default() -> Self {
        Self {
            min_submissions: 5,
            max_mean_interval_secs: 60.0,
            risk_score: 0.8,
        }
    }
}

/// Corpus pattern mining settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub duplicate_signature: DuplicateSignatureConfig,
    pub amount_manipulation: AmountManipulationConfig,
    pub identity_reuse: IdentityReuseConfig,
    pub coordinated_tampering: CoordinatedTamperingConfig,
    pub template_fraud: TemplateFraudConfig,
    pub rapid_submissions: RapidSubmissionsConfig,
}
