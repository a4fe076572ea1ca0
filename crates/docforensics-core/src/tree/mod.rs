/// Document tree model
///
/// Documents arrive as arbitrary nested JSON-like structures. They are held
/// as a tagged union of scalars, lists and maps so the diff and fingerprint
/// walks are exhaustive over the shapes they can meet.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::EngineError;

pub mod path;

pub use path::{FieldPath, PathSegment};

/// Leaf value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

/// One node of a document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentNode {
    Scalar(Scalar),
    List(Vec<DocumentNode>),
    Map(BTreeMap<String, DocumentNode>),
}

/// Coarse node kind, used by structural hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Null,
    Bool,
    Number,
    Text,
    List,
    Map,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Null => "null",
            NodeKind::Bool => "bool",
            NodeKind::Number => "number",
            NodeKind::Text => "text",
            NodeKind::List => "list",
            NodeKind::Map => "map",
        };
        f.write_str(name)
    }
}

impl Scalar {
    pub fn kind(&self) -> NodeKind {
        match self {
            Scalar::Null => NodeKind::Null,
            Scalar::Bool(_) => NodeKind::Bool,
            Scalar::Number(_) => NodeKind::Number,
            Scalar::Text(_) => NodeKind::Text,
        }
    }

    /// Numeric reading of the value
    ///
    /// Text such as `"$100,000.00"` or `"1,250"` is read as a number so that
    /// amounts typed as strings still produce percentage deltas.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) if n.is_finite() => Some(*n),
            Scalar::Text(text) => parse_numeric_text(text),
            _ => None,
        }
    }

    /// Type-coerced canonical text used for hashing and comparison
    pub fn canonical(&self, path: &FieldPath) -> Result<String, EngineError> {
        match self {
            Scalar::Null => Ok("null".to_string()),
            Scalar::Bool(b) => Ok(b.to_string()),
            Scalar::Number(n) => canonical_number(*n)
                .ok_or_else(|| EngineError::validation(path, "non-finite number cannot be hashed")),
            Scalar::Text(text) => Ok(text.trim().to_lowercase()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => match canonical_number(*n) {
                Some(text) => f.write_str(&text),
                None => write!(f, "{}", n),
            },
            Scalar::Text(text) => f.write_str(text),
        }
    }
}

/// Whole numbers render without a fractional part so `100000` and `100000.0` agree
pub(crate) fn canonical_number(n: f64) -> Option<String> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Some(format!("{}", n as i64))
    } else {
        Some(format!("{}", n))
    }
}

fn parse_numeric_text(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let body = unsigned
        .strip_prefix('$')
        .or_else(|| unsigned.strip_prefix('€'))
        .or_else(|| unsigned.strip_prefix('£'))
        .unwrap_or(unsigned)
        .trim();
    if body.is_empty() || !body.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    if !body.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
        return None;
    }
    let value: f64 = body.replace(',', "").parse().ok()?;
    if trimmed.starts_with('-') {
        Some(-value)
    } else {
        Some(value)
    }
}

impl DocumentNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            DocumentNode::Scalar(scalar) => scalar.kind(),
            DocumentNode::List(_) => NodeKind::List,
            DocumentNode::Map(_) => NodeKind::Map,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, DocumentNode>> {
        match self {
            DocumentNode::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            DocumentNode::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// Number of direct children
    pub fn branching(&self) -> usize {
        match self {
            DocumentNode::Scalar(_) => 0,
            DocumentNode::List(items) => items.len(),
            DocumentNode::Map(map) => map.len(),
        }
    }

    /// Leaf count; empty containers count as one leaf
    pub fn leaf_count(&self) -> usize {
        match self {
            DocumentNode::Scalar(_) => 1,
            DocumentNode::List(items) if items.is_empty() => 1,
            DocumentNode::Map(map) if map.is_empty() => 1,
            DocumentNode::List(items) => items.iter().map(DocumentNode::leaf_count).sum(),
            DocumentNode::Map(map) => map.values().map(DocumentNode::leaf_count).sum(),
        }
    }

    /// Nesting depth; a scalar is depth 0, a flat map is depth 1
    pub fn depth(&self) -> usize {
        match self {
            DocumentNode::Scalar(_) => 0,
            DocumentNode::List(items) => 1 + items.iter().map(DocumentNode::depth).max().unwrap_or(0),
            DocumentNode::Map(map) => 1 + map.values().map(DocumentNode::depth).max().unwrap_or(0),
        }
    }

    /// Visit every node in pre-order together with its path
    pub fn walk<F>(&self, visit: &mut F)
    where
        F: FnMut(&FieldPath, &DocumentNode),
    {
        self.walk_from(&FieldPath::root(), visit);
    }

    fn walk_from<F>(&self, path: &FieldPath, visit: &mut F)
    where
        F: FnMut(&FieldPath, &DocumentNode),
    {
        visit(path, self);
        match self {
            DocumentNode::Scalar(_) => {}
            DocumentNode::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    item.walk_from(&path.index(i), visit);
                }
            }
            DocumentNode::Map(map) => {
                for (key, value) in map {
                    value.walk_from(&path.key(key.as_str()), visit);
                }
            }
        }
    }

    /// All scalar leaves with their paths, in key order
    pub fn leaves(&self) -> Vec<(FieldPath, &Scalar)> {
        let mut out = Vec::new();
        self.collect_leaves(FieldPath::root(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, path: FieldPath, out: &mut Vec<(FieldPath, &'a Scalar)>) {
        match self {
            DocumentNode::Scalar(scalar) => out.push((path, scalar)),
            DocumentNode::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    item.collect_leaves(path.index(i), out);
                }
            }
            DocumentNode::Map(map) => {
                for (key, value) in map {
                    value.collect_leaves(path.key(key.as_str()), out);
                }
            }
        }
    }

    /// Resolve a path against this tree
    pub fn get(&self, path: &FieldPath) -> Option<&DocumentNode> {
        let mut node = self;
        for segment in path.segments() {
            node = match (segment, node) {
                (PathSegment::Key(key), DocumentNode::Map(map)) => map.get(key)?,
                (PathSegment::Index(i), DocumentNode::List(items)) => items.get(*i)?,
                (PathSegment::Match { key, value }, DocumentNode::List(items)) => {
                    items.iter().find(|item| {
                        item.as_map()
                            .and_then(|m| m.get(key))
                            .and_then(DocumentNode::as_scalar)
                            .is_some_and(|s| s.to_string() == *value)
                    })?
                }
                _ => return None,
            };
        }
        Some(node)
    }

    /// Check every leaf can be coerced to a hashable scalar
    pub fn validate(&self) -> Result<(), EngineError> {
        for (path, scalar) in self.leaves() {
            scalar.canonical(&path)?;
        }
        Ok(())
    }
}

impl From<&serde_json::Value> for DocumentNode {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => DocumentNode::Scalar(Scalar::Null),
            Value::Bool(b) => DocumentNode::Scalar(Scalar::Bool(*b)),
            Value::Number(n) => match n.as_f64() {
                Some(f) => DocumentNode::Scalar(Scalar::Number(f)),
                None => DocumentNode::Scalar(Scalar::Text(n.to_string())),
            },
            Value::String(s) => DocumentNode::Scalar(Scalar::Text(s.clone())),
            Value::Array(items) => DocumentNode::List(items.iter().map(DocumentNode::from).collect()),
            Value::Object(map) => DocumentNode::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), DocumentNode::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for DocumentNode {
    fn from(value: serde_json::Value) -> Self {
        DocumentNode::from(&value)
    }
}

impl From<Scalar> for DocumentNode {
    fn from(scalar: Scalar) -> Self {
        DocumentNode::Scalar(scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_and_shape_metrics() {
        let doc = DocumentNode::from(json!({
            "loan_amount": 250000,
            "borrower": {"name": "Ada", "address": [{"zip": "10001"}, {"zip": "10002"}]},
            "notes": []
        }));
        assert_eq!(doc.leaf_count(), 5);
        assert_eq!(doc.depth(), 4);
        assert_eq!(doc.branching(), 3);

        let zip = doc
            .get(&FieldPath::parse("borrower.address[1].zip").unwrap())
            .and_then(DocumentNode::as_scalar)
            .cloned();
        assert_eq!(zip, Some(Scalar::Text("10002".into())));
    }

    #[test]
    fn test_numeric_text_is_read_as_number() {
        assert_eq!(Scalar::Text("$100,000.00".into()).as_number(), Some(100000.0));
        assert_eq!(Scalar::Text("-1,250".into()).as_number(), Some(-1250.0));
        assert_eq!(Scalar::Text("10001-2".into()).as_number(), None);
        assert_eq!(Scalar::Text("n/a".into()).as_number(), None);
        assert_eq!(Scalar::Bool(true).as_number(), None);
    }

    #[test]
    fn test_canonical_numbers_ignore_representation() {
        let path = FieldPath::root();
        assert_eq!(Scalar::Number(100000.0).canonical(&path).unwrap(), "100000");
        assert_eq!(Scalar::Number(0.5).canonical(&path).unwrap(), "0.5");
        assert!(Scalar::Number(f64::NAN).canonical(&path).is_err());
    }

    #[test]
    fn test_untagged_deserialization() {
        let doc: DocumentNode =
            serde_json::from_str(r#"{"a": null, "b": [1, "x", true], "c": {"d": 2.5}}"#).unwrap();
        assert_eq!(doc, DocumentNode::from(json!({"a": null, "b": [1, "x", true], "c": {"d": 2.5}})));
    }
}
