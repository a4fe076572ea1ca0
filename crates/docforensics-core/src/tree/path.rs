/// Field addressing inside a document tree
///
/// A `FieldPath` is an immutable list of typed segments. Its text form is
/// `borrower.address[0].zip`, with `[key=value]` for list elements aligned
/// by identity key and `["odd.key"]` for keys that contain separators.
use nom::{
    branch::alt,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, peek},
    multi::many0,
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// Map key
    Key(String),
    /// Positional list element
    Index(usize),
    /// List element located by a stable identity key
    Match { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// New path with one more segment
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(segment);
        Self { segments }
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        self.child(PathSegment::Key(key.into()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.child(PathSegment::Index(index))
    }

    /// Name of the innermost map key, skipping list segments
    pub fn last_key(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|segment| match segment {
            PathSegment::Key(key) => Some(key.as_str()),
            _ => None,
        })
    }

    /// Text form with every list position replaced by `[*]`
    pub fn generalized(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => push_key(&mut out, key),
                PathSegment::Index(_) | PathSegment::Match { .. } => out.push_str("[*]"),
            }
        }
        out
    }

    /// Parse the text form; the empty string is the root path
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        if input.is_empty() {
            return Ok(Self::root());
        }
        match all_consuming(field_path)(input) {
            Ok((_, segments)) => Ok(Self { segments }),
            Err(e) => Err(EngineError::invalid_input(
                input,
                format!("malformed field path ({})", e),
            )),
        }
    }
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty() || key.chars().any(|c| !is_key_char(c))
}

fn push_key(out: &mut String, key: &str) {
    if needs_quoting(key) {
        out.push_str("[\"");
        out.push_str(key);
        out.push_str("\"]");
    } else {
        if !out.is_empty() {
            out.push('.');
        }
        out.push_str(key);
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => push_key(&mut out, key),
                PathSegment::Index(i) => out.push_str(&format!("[{}]", i)),
                PathSegment::Match { key, value } => {
                    out.push_str(&format!("[{}={}]", key, value))
                }
            }
        }
        f.write_str(&out)
    }
}

impl FromStr for FieldPath {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "<root>" {
            return Ok(Self::root());
        }
        Self::parse(s)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// Grammar

fn is_key_char(c: char) -> bool {
    !matches!(c, '.' | '[' | ']' | '=' | '"')
}

fn bare_key(input: &str) -> IResult<&str, PathSegment> {
    map(nom::bytes::complete::take_while1(is_key_char), |k: &str| {
        PathSegment::Key(k.to_string())
    })(input)
}

fn index(input: &str) -> IResult<&str, PathSegment> {
    map_res(terminated(digit1, peek(char(']'))), |digits: &str| {
        digits.parse::<usize>().map(PathSegment::Index)
    })(input)
}

fn quoted_key(input: &str) -> IResult<&str, PathSegment> {
    map(
        delimited(
            char('"'),
            nom::bytes::complete::take_while(|c: char| c != '"'),
            char('"'),
        ),
        |k: &str| PathSegment::Key(k.to_string()),
    )(input)
}

fn identity_match(input: &str) -> IResult<&str, PathSegment> {
    map(
        separated_pair(
            nom::bytes::complete::take_while1(is_key_char),
            char('='),
            nom::bytes::complete::take_while1(|c: char| c != ']'),
        ),
        |(key, value): (&str, &str)| PathSegment::Match {
            key: key.to_string(),
            value: value.to_string(),
        },
    )(input)
}

fn bracket(input: &str) -> IResult<&str, PathSegment> {
    delimited(
        char('['),
        alt((index, quoted_key, identity_match)),
        char(']'),
    )(input)
}

fn field_path(input: &str) -> IResult<&str, Vec<PathSegment>> {
    map(
        pair(
            alt((bracket, bare_key)),
            many0(alt((preceded(char('.'), bare_key), bracket))),
        ),
        |(head, tail)| {
            let mut segments = Vec::with_capacity(tail.len() + 1);
            segments.push(head);
            segments.extend(tail);
            segments
        },
    )(input)
}
