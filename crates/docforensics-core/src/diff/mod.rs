/// Structural diff engine
///
/// Walks two document snapshots in lock-step, classifies every differing
/// field and scores the change set. Pure function of its inputs and the
/// compiled rule tables.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::config::DiffRules;
use crate::error::{ConfigError, EngineError};
use crate::scoring::{round4, RiskLevel};
use crate::tree::{DocumentNode, FieldPath, PathSegment, Scalar};

pub mod classify;
pub mod risk;

pub use classify::FieldClassifier;
pub use risk::ChangeMagnitude;

/// Kind of difference at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

/// Field category assigned by the static classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Financial,
    Identity,
    Signature,
    Metadata,
    Other,
}

impl ChangeCategory {
    /// Categories whose edits are substantive rather than cosmetic
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            ChangeCategory::Financial | ChangeCategory::Identity | ChangeCategory::Signature
        )
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeCategory::Financial => "financial",
            ChangeCategory::Identity => "identity",
            ChangeCategory::Signature => "signature",
            ChangeCategory::Metadata => "metadata",
            ChangeCategory::Other => "other",
        };
        f.write_str(name)
    }
}

/// One detected difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub path: FieldPath,
    pub change_type: ChangeType,
    pub category: ChangeCategory,
    pub old_value: Option<DocumentNode>,
    pub new_value: Option<DocumentNode>,
    pub risk_score: f64,
    pub percent_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_pct: Option<f64>,
    #[serde(default)]
    pub round_number: bool,
}

/// Summary counts for a comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffStatistics {
    pub leaves_compared: usize,
    pub leaves_changed: usize,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub by_category: BTreeMap<ChangeCategory, usize>,
}

/// Outcome of comparing two snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    pub changes: Vec<Change>,
    pub overall_similarity: f64,
    pub total_changes: usize,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub suspicious_patterns: Vec<String>,
    pub recommendation: String,
    pub statistics: DiffStatistics,
}

impl DiffResult {
    pub fn is_identical(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes_in(&self, category: ChangeCategory) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(move |c| c.category == category)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Difference found by the walk, before classification
#[derive(Debug)]
struct RawChange {
    path: FieldPath,
    change_type: ChangeType,
    old_value: Option<DocumentNode>,
    new_value: Option<DocumentNode>,
}

#[derive(Debug, Default)]
struct WalkState {
    changes: Vec<RawChange>,
    leaves_compared: usize,
    leaves_changed: usize,
}

/// Structural diff engine with compiled rule tables
#[derive(Debug, Clone)]
pub struct DiffEngine {
    rules: DiffRules,
    classifier: FieldClassifier,
}

impl DiffEngine {
    pub fn new(rules: DiffRules) -> Result<Self, ConfigError> {
        let classifier = FieldClassifier::new(&rules)?;
        Ok(Self { rules, classifier })
    }

    pub fn classifier(&self) -> &FieldClassifier {
        &self.classifier
    }

    /// Compare two document snapshots
    pub fn compare(&self, old: &DocumentNode, new: &DocumentNode) -> Result<DiffResult, EngineError> {
        for (side, tree) in [("old", old), ("new", new)] {
            if !matches!(tree, DocumentNode::Map(_)) {
                tracing::warn!("Rejecting {} tree: root is a {}", side, tree.kind());
                return Err(EngineError::validation(
                    &FieldPath::root(),
                    format!("{} document root must be a mapping, found {}", side, tree.kind()),
                ));
            }
            tree.validate()?;
        }

        let mut state = WalkState::default();
        self.diff_node(&FieldPath::root(), old, new, &mut state);

        let changes: Vec<Change> = state
            .changes
            .into_iter()
            .map(|raw| self.finish_change(raw))
            .collect();

        let overall_similarity = if state.leaves_compared == 0 {
            1.0
        } else {
            round4(1.0 - state.leaves_changed as f64 / state.leaves_compared as f64)
        };
        // Rounding must never report a changed tree as identical
        let overall_similarity = if changes.is_empty() {
            1.0
        } else {
            overall_similarity.min(0.9999)
        };

        let risk_score = risk::aggregate_risk(&self.rules, &changes);
        let risk_level = RiskLevel::from_score(risk_score);
        let suspicious_patterns = risk::suspicious_patterns(&self.rules, &changes);

        let statistics = DiffStatistics {
            leaves_compared: state.leaves_compared,
            leaves_changed: state.leaves_changed,
            added: count_type(&changes, ChangeType::Added),
            removed: count_type(&changes, ChangeType::Removed),
            modified: count_type(&changes, ChangeType::Modified),
            by_category: risk::category_counts(&changes),
        };

        tracing::info!(
            "Diff complete: {} changes, similarity {:.3}, risk {:.2} ({})",
            changes.len(),
            overall_similarity,
            risk_score,
            risk_level
        );

        Ok(DiffResult {
            total_changes: changes.len(),
            changes,
            overall_similarity,
            risk_score,
            risk_level,
            suspicious_patterns,
            recommendation: risk_level.recommendation().to_string(),
            statistics,
        })
    }

    fn finish_change(&self, raw: RawChange) -> Change {
        let category = self
            .classifier
            .classify(&raw.path, [raw.old_value.as_ref(), raw.new_value.as_ref()]);
        let magnitude = if raw.change_type == ChangeType::Modified {
            ChangeMagnitude::measure(&self.rules, raw.old_value.as_ref(), raw.new_value.as_ref())
        } else {
            ChangeMagnitude::default()
        };
        let risk_score = risk::score_change(&self.rules, category, &magnitude);

        tracing::debug!(
            "{:?} {} [{}] risk {:.2}",
            raw.change_type,
            raw.path,
            category,
            risk_score
        );

        Change {
            path: raw.path,
            change_type: raw.change_type,
            category,
            old_value: raw.old_value,
            new_value: raw.new_value,
            risk_score,
            percent_delta: magnitude.percent_delta,
            magnitude_pct: magnitude.magnitude_pct,
            round_number: magnitude.round_number,
        }
    }

    fn diff_node(&self, path: &FieldPath, old: &DocumentNode, new: &DocumentNode, state: &mut WalkState) {
        match (old, new) {
            (DocumentNode::Map(a), DocumentNode::Map(b)) => {
                if a.is_empty() && b.is_empty() {
                    state.leaves_compared += 1;
                    return;
                }
                let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
                for key in keys {
                    let child = path.key(key.as_str());
                    self.diff_pair(child, a.get(key), b.get(key), state);
                }
            }
            (DocumentNode::List(a), DocumentNode::List(b)) => {
                if a.is_empty() && b.is_empty() {
                    state.leaves_compared += 1;
                    return;
                }
                match self.identity_alignment(a, b) {
                    Some((key, pairs)) => {
                        for (value, left, right) in pairs {
                            let child = path.child(PathSegment::Match {
                                key: key.clone(),
                                value,
                            });
                            self.diff_pair(child, left, right, state);
                        }
                    }
                    None => {
                        for i in 0..a.len().max(b.len()) {
                            self.diff_pair(path.index(i), a.get(i), b.get(i), state);
                        }
                    }
                }
            }
            (DocumentNode::Scalar(a), DocumentNode::Scalar(b)) => {
                state.leaves_compared += 1;
                if !scalar_eq(a, b) {
                    state.leaves_changed += 1;
                    state.changes.push(RawChange {
                        path: path.clone(),
                        change_type: ChangeType::Modified,
                        old_value: Some(old.clone()),
                        new_value: Some(new.clone()),
                    });
                }
            }
            _ => {
                // Shape changed at this node (e.g. scalar replaced by a map)
                let leaves = old.leaf_count().max(new.leaf_count());
                state.leaves_compared += leaves;
                state.leaves_changed += leaves;
                state.changes.push(RawChange {
                    path: path.clone(),
                    change_type: ChangeType::Modified,
                    old_value: Some(old.clone()),
                    new_value: Some(new.clone()),
                });
            }
        }
    }

    fn diff_pair(
        &self,
        path: FieldPath,
        old: Option<&DocumentNode>,
        new: Option<&DocumentNode>,
        state: &mut WalkState,
    ) {
        match (old, new) {
            (Some(a), Some(b)) => self.diff_node(&path, a, b, state),
            (Some(a), None) => {
                let leaves = a.leaf_count();
                state.leaves_compared += leaves;
                state.leaves_changed += leaves;
                state.changes.push(RawChange {
                    path,
                    change_type: ChangeType::Removed,
                    old_value: Some(a.clone()),
                    new_value: None,
                });
            }
            (None, Some(b)) => {
                let leaves = b.leaf_count();
                state.leaves_compared += leaves;
                state.leaves_changed += leaves;
                state.changes.push(RawChange {
                    path,
                    change_type: ChangeType::Added,
                    old_value: None,
                    new_value: Some(b.clone()),
                });
            }
            (None, None) => {}
        }
    }

    /// Align list elements by the first identity key every element carries
    ///
    /// Returns `(key, [(identity, old, new)])` ordered by identity value, or
    /// `None` when positional comparison must be used.
    #[allow(clippy::type_complexity)]
    fn identity_alignment<'a>(
        &self,
        old: &'a [DocumentNode],
        new: &'a [DocumentNode],
    ) -> Option<(String, Vec<(String, Option<&'a DocumentNode>, Option<&'a DocumentNode>)>)> {
        for key in &self.rules.identity_keys {
            let (Some(left), Some(right)) = (identity_index(old, key), identity_index(new, key)) else {
                continue;
            };
            let identities: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
            let pairs = identities
                .into_iter()
                .map(|id| (id.clone(), left.get(id).copied(), right.get(id).copied()))
                .collect();
            return Some((key.clone(), pairs));
        }
        None
    }
}

/// Map identity value → element, if every element has a unique scalar identity
fn identity_index<'a>(items: &'a [DocumentNode], key: &str) -> Option<BTreeMap<String, &'a DocumentNode>> {
    if items.is_empty() {
        return None;
    }
    let mut index = BTreeMap::new();
    let mut seen = HashSet::new();
    for item in items {
        let identity = match item.as_map()?.get(key)?.as_scalar()? {
            Scalar::Null => return None,
            scalar => scalar.to_string(),
        };
        if identity.is_empty() || identity.contains(']') || !seen.insert(identity.clone()) {
            return None;
        }
        index.insert(identity, item);
    }
    Some(index)
}

fn scalar_eq(a: &Scalar, b: &Scalar) -> bool {
    match (a, b) {
        (Scalar::Number(x), Scalar::Number(y)) => x == y,
        _ => a == b,
    }
}

fn count_type(changes: &[Change], change_type: ChangeType) -> usize {
    changes.iter().filter(|c| c.change_type == change_type).count()
}
