/// Text feature extraction for the style and semantic layers
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::diff::classify::compile_rule;
use crate::error::ConfigError;
use crate::tree::Scalar;

const CURRENCY_PATTERN: &str = r"[$€£]\s?\d[\d,]*(?:\.\d{1,2})?";
const SSN_PATTERN: &str = r"\b\d{3}-\d{2}-\d{4}\b";
const EMAIL_PATTERN: &str = r"[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}";
const NUMBER_PATTERN: &str = r"\b\d{4,}\b";
const DATE_PATTERN: &str = r"^\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}([ T]\d{1,2}:\d{2}(:\d{2})?)?";

/// Entities pulled from string leaves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySet {
    pub financial: Vec<String>,
    pub identity: Vec<String>,
    pub numbers: Vec<String>,
}

impl EntitySet {
    pub fn is_empty(&self) -> bool {
        self.financial.is_empty() && self.identity.is_empty() && self.numbers.is_empty()
    }
}

/// Compiled extraction patterns
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    currency: Regex,
    ssn: Regex,
    email: Regex,
    number: Regex,
    date: Regex,
}

impl EntityExtractor {
    pub fn new() -> Result<Self, ConfigError> {
        let table = "fingerprint.entities";
        Ok(Self {
            currency: compile_rule(table, CURRENCY_PATTERN)?,
            ssn: compile_rule(table, SSN_PATTERN)?,
            email: compile_rule(table, EMAIL_PATTERN)?,
            number: compile_rule(table, NUMBER_PATTERN)?,
            date: compile_rule(table, DATE_PATTERN)?,
        })
    }

    /// Extract entities from a set of text values
    pub fn extract<'a, I>(&self, texts: I) -> EntitySet
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut financial = BTreeSet::new();
        let mut identity = BTreeSet::new();
        let mut numbers = BTreeSet::new();

        for text in texts {
            for m in self.currency.find_iter(text) {
                financial.insert(m.as_str().replace([' ', ','], ""));
            }
            for m in self.ssn.find_iter(text) {
                identity.insert(m.as_str().to_string());
            }
            for m in self.email.find_iter(text) {
                identity.insert(m.as_str().to_lowercase());
            }
            // Digits already claimed by currency, SSNs or dates are not free numbers
            let stripped = self.currency.replace_all(text, " ");
            let stripped = self.ssn.replace_all(&stripped, " ");
            if !self.date.is_match(stripped.trim()) {
                for m in self.number.find_iter(&stripped) {
                    numbers.insert(m.as_str().to_string());
                }
            }
        }

        EntitySet {
            financial: financial.into_iter().collect(),
            identity: identity.into_iter().collect(),
            numbers: numbers.into_iter().collect(),
        }
    }

    /// Formatting convention of a leaf value, if it has a recognisable one
    pub fn value_style(&self, scalar: &Scalar) -> Option<String> {
        match scalar {
            Scalar::Number(n) if n.fract() == 0.0 => Some("num:native-int".to_string()),
            Scalar::Number(_) => Some("num:native-frac".to_string()),
            Scalar::Bool(_) => Some("bool:native".to_string()),
            Scalar::Null => None,
            Scalar::Text(text) => self.text_style(text.trim()),
        }
    }

    fn text_style(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        if self.date.is_match(text) {
            return Some(format!("date:{}", digit_shape(text)));
        }
        if scalar_is_numeric_text(text) {
            let mut features = Vec::new();
            if text.starts_with(['$', '€', '£']) {
                features.push("currency".to_string());
            }
            if text.contains(',') {
                features.push("grouped".to_string());
            }
            if let Some((_, frac)) = text.split_once('.') {
                features.push(format!("dp{}", frac.len()));
            }
            if features.is_empty() {
                features.push("plain".to_string());
            }
            return Some(format!("num:text-{}", features.join("-")));
        }
        let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.len() < 2 {
            return None;
        }
        if letters.iter().all(|c| c.is_uppercase()) {
            Some("text:upper".to_string())
        } else if letters.iter().all(|c| c.is_lowercase()) {
            Some("text:lower".to_string())
        } else if text
            .split_whitespace()
            .all(|word| word.chars().next().is_some_and(|c| !c.is_alphabetic() || c.is_uppercase()))
        {
            Some("text:title".to_string())
        } else {
            None
        }
    }
}

fn scalar_is_numeric_text(text: &str) -> bool {
    Scalar::Text(text.to_string()).as_number().is_some()
}

/// Digits become `9`, everything else is kept: `2024-01-15` → `9999-99-99`
fn digit_shape(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_digit() { '9' } else { c })
        .collect()
}

/// Naming convention of a map key
pub fn key_case(key: &str) -> &'static str {
    let has_lower = key.chars().any(|c| c.is_lowercase());
    let has_upper = key.chars().any(|c| c.is_uppercase());
    let starts_upper = key.chars().next().is_some_and(|c| c.is_uppercase());

    if key.contains('-') {
        "kebab"
    } else if key.contains('_') {
        if has_upper && !has_lower {
            "upper_snake"
        } else if has_lower && !has_upper {
            "snake"
        } else {
            "mixed"
        }
    } else if has_upper && has_lower {
        if starts_upper {
            "pascal"
        } else {
            "camel"
        }
    } else if has_upper {
        "upper"
    } else if key.contains(' ') {
        "spaced"
    } else {
        "lower"
    }
}

/// Frequency-ranked keywords from text values
pub fn extract_keywords<'a, I>(
    texts: I,
    stopwords: &HashSet<String>,
    min_length: usize,
    min_frequency: usize,
    limit: usize,
) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if token.chars().count() < min_length || token.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let token = token.to_lowercase();
            if stopwords.contains(&token) {
                continue;
            }
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= min_frequency)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(word, _)| word).collect()
}
