/// Static field classifier
///
/// Field-name rules are tried against the innermost key first and then the
/// generalized full path, so `signatures[0].image` still lands in Signature.
/// Value-shape rules only apply when no name rule matched.
use regex::{Regex, RegexBuilder};

use crate::config::{CategoryRule, DiffRules};
use crate::diff::ChangeCategory;
use crate::error::ConfigError;
use crate::tree::{DocumentNode, FieldPath};

#[derive(Debug, Clone)]
pub struct FieldClassifier {
    name_rules: Vec<(ChangeCategory, Regex)>,
    value_rules: Vec<(ChangeCategory, Regex)>,
}

pub(crate) fn compile_rule(table: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::InvalidRule {
            table,
            pattern: pattern.to_string(),
            source,
        })
}

fn compile_table(
    table: &'static str,
    rules: &[CategoryRule],
) -> Result<Vec<(ChangeCategory, Regex)>, ConfigError> {
    rules
        .iter()
        .map(|rule| Ok((rule.category, compile_rule(table, &rule.pattern)?)))
        .collect()
}

impl FieldClassifier {
    pub fn new(rules: &DiffRules) -> Result<Self, ConfigError> {
        Ok(Self {
            name_rules: compile_table("diff.category_rules", &rules.category_rules)?,
            value_rules: compile_table("diff.value_rules", &rules.value_rules)?,
        })
    }

    /// Category from the field name alone
    pub fn classify_name(&self, path: &FieldPath) -> Option<ChangeCategory> {
        if let Some(key) = path.last_key() {
            if let Some(category) = self.match_name(key) {
                return Some(category);
            }
        }
        self.match_name(&path.generalized())
    }

    fn match_name(&self, name: &str) -> Option<ChangeCategory> {
        self.name_rules
            .iter()
            .find(|(_, re)| re.is_match(name))
            .map(|(category, _)| *category)
    }

    /// Category for a change, consulting both sides' values
    ///
    /// Both values are checked against each rule in turn so the result does
    /// not depend on which tree is "old" and which is "new".
    pub fn classify(&self, path: &FieldPath, values: [Option<&DocumentNode>; 2]) -> ChangeCategory {
        if let Some(category) = self.classify_name(path) {
            return category;
        }
        let texts: Vec<&str> = values
            .iter()
            .flatten()
            .filter_map(|node| node.as_scalar())
            .filter_map(|scalar| scalar.as_text())
            .map(str::trim)
            .collect();
        self.value_rules
            .iter()
            .find(|(_, re)| texts.iter().any(|text| re.is_match(text)))
            .map(|(category, _)| *category)
            .unwrap_or(ChangeCategory::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Scalar;

    fn classifier() -> FieldClassifier {
        FieldClassifier::new(&DiffRules::default()).unwrap()
    }

    fn path(text: &str) -> FieldPath {
        FieldPath::parse(text).unwrap()
    }

    #[test]
    fn test_field_name_rules() {
        let c = classifier();
        assert_eq!(c.classify_name(&path("loan_amount")), Some(ChangeCategory::Financial));
        assert_eq!(c.classify_name(&path("borrower.SSN")), Some(ChangeCategory::Identity));
        assert_eq!(c.classify_name(&path("borrower_signature")), Some(ChangeCategory::Signature));
        assert_eq!(c.classify_name(&path("created_at")), Some(ChangeCategory::Metadata));
        assert_eq!(c.classify_name(&path("favorite_color")), None);
    }

    #[test]
    fn test_signature_wins_over_date() {
        assert_eq!(
            classifier().classify_name(&path("signature_date")),
            Some(ChangeCategory::Signature)
        );
    }

    #[test]
    fn test_parent_path_used_when_leaf_key_is_generic() {
        assert_eq!(
            classifier().classify_name(&path("signatures[0].image")),
            Some(ChangeCategory::Signature)
        );
    }

    #[test]
    fn test_value_heuristics_for_unmapped_fields() {
        let c = classifier();
        let ssn = DocumentNode::Scalar(Scalar::Text("123-45-6789".into()));
        let plain = DocumentNode::Scalar(Scalar::Text("blue".into()));
        let money = DocumentNode::Scalar(Scalar::Text("$12,500.00".into()));

        assert_eq!(c.classify(&path("misc"), [Some(&plain), Some(&ssn)]), ChangeCategory::Identity);
        assert_eq!(c.classify(&path("misc"), [Some(&ssn), Some(&plain)]), ChangeCategory::Identity);
        assert_eq!(c.classify(&path("misc"), [None, Some(&money)]), ChangeCategory::Financial);
        assert_eq!(c.classify(&path("misc"), [Some(&plain), None]), ChangeCategory::Other);
    }

    #[test]
    fn test_invalid_rule_is_config_error() {
        let mut rules = DiffRules::default();
        rules.category_rules[0].pattern = "(unclosed".to_string();
        let err = FieldClassifier::new(&rules).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { table: "diff.category_rules", .. }));
    }
}
