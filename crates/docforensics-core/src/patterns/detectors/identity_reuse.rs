/// One SSN or e-mail address claimed by several borrowers
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::IdentityReuseConfig;
use crate::diff::classify::compile_rule;
use crate::error::{ConfigError, EngineError};
use crate::patterns::{CorpusEntry, Detector, Pattern, PatternType};
use crate::scoring::{group_confidence, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum IdentityKind {
    Ssn,
    Email,
}

impl IdentityKind {
    fn label(&self) -> &'static str {
        match self {
            IdentityKind::Ssn => "ssn",
            IdentityKind::Email => "email",
        }
    }

    fn normalize(&self, raw: &str) -> Option<String> {
        match self {
            IdentityKind::Ssn => {
                let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
                (digits.len() == 9).then_some(digits)
            }
            IdentityKind::Email => {
                let email = raw.trim().to_lowercase();
                email.contains('@').then_some(email)
            }
        }
    }

    /// Reviewers see enough to match records, not the full identifier
    fn mask(&self, normalized: &str) -> String {
        match self {
            IdentityKind::Ssn => format!("***-**-{}", &normalized[normalized.len().saturating_sub(4)..]),
            IdentityKind::Email => match normalized.split_once('@') {
                Some((local, domain)) => {
                    let first: String = local.chars().take(1).collect();
                    format!("{}***@{}", first, domain)
                }
                None => "***".to_string(),
            },
        }
    }
}

pub struct IdentityReuseDetector {
    config: IdentityReuseConfig,
    ssn_field: Regex,
    email_field: Regex,
}

impl IdentityReuseDetector {
    pub fn new(config: IdentityReuseConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            ssn_field: compile_rule("patterns.identity_reuse.ssn_field_pattern", &config.ssn_field_pattern)?,
            email_field: compile_rule(
                "patterns.identity_reuse.email_field_pattern",
                &config.email_field_pattern,
            )?,
            config,
        })
    }

    fn identities(&self, entry: &CorpusEntry) -> BTreeSet<(IdentityKind, String)> {
        let mut found = BTreeSet::new();
        for (path, scalar) in entry.fields.leaves() {
            let (Some(key), Some(text)) = (path.last_key(), scalar.as_text()) else {
                continue;
            };
            let kind = if self.ssn_field.is_match(key) {
                IdentityKind::Ssn
            } else if self.email_field.is_match(key) {
                IdentityKind::Email
            } else {
                continue;
            };
            if let Some(value) = kind.normalize(text) {
                found.insert((kind, value));
            }
        }
        found
    }
}

impl Detector for IdentityReuseDetector {
    fn name(&self) -> &'static str {
        "identity_reuse"
    }

    fn scan(&self, corpus: &[CorpusEntry]) -> Result<Vec<Pattern>, EngineError> {
        let mut groups: BTreeMap<(IdentityKind, String), Vec<&CorpusEntry>> = BTreeMap::new();
        for entry in corpus {
            for identity in self.identities(entry) {
                groups.entry(identity).or_default().push(entry);
            }
        }

        let min_borrowers = self.config.min_borrowers.max(2);
        let mut patterns = Vec::new();
        for ((kind, value), members) in groups {
            let borrowers: BTreeSet<&str> = members.iter().map(|e| e.borrower()).collect();
            if borrowers.len() < min_borrowers {
                continue;
            }
            let ids: Vec<String> = members.iter().map(|e| e.document_id.clone()).collect();
            let borrower_ids: Vec<String> = borrowers.iter().map(|b| b.to_string()).collect();
            patterns.push(
                Pattern::new(
                    PatternType::IdentityReuse,
                    Severity::Critical,
                    format!(
                        "{} {} shared by {} distinct borrowers",
                        kind.label().to_uppercase(),
                        kind.mask(&value),
                        borrowers.len()
                    ),
                    ids,
                    self.config.risk_score,
                    group_confidence(borrowers.len(), min_borrowers, 1.0),
                )
                .with_evidence("identity_type", kind.label())
                .with_evidence("identity", kind.mask(&value))
                .with_evidence("borrower_count", borrowers.len())
                .with_evidence("borrowers", borrower_ids)
                .with_evidence("document_count", members.len()),
            );
        }
        Ok(patterns)
    }
}
