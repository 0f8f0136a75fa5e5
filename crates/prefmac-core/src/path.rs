//! # Field Key Paths
//!
//! Protected preferences are addressed by key paths into the JSON document.
//! Two spellings are accepted and may be mixed:
//!
//! | Form | Example | Segments |
//! |------|---------|----------|
//! | Dotted | `session.startup_urls` | `session`, `startup_urls` |
//! | Bracketed | `['session']['startup_urls']` | `session`, `startup_urls` |
//! | Quoted key with dots | `extensions['a.b'].state` | `extensions`, `a.b`, `state` |
//! | Array index | `pinned_tabs[0]` | `pinned_tabs`, `0` |
//!
//! The path text itself is part of the MAC message, so a [`FieldPath`] keeps
//! the exact text it was parsed from.

use crate::models::{PrefMacError, Result};
use serde_json::{Map, Value};
use std::fmt;

/// One step of a key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object member name.
    Key(String),
    /// Array position.
    Index(usize),
}

impl Segment {
    /// Member name used when the segment addresses an object, including the
    /// nested tag layout where indices become decimal keys.
    pub fn as_key(&self) -> String {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

/// A parsed key path.
///
/// # Example
///
/// ```rust
/// use prefmac_core::path::FieldPath;
/// use serde_json::json;
///
/// let doc = json!({"session": {"startup_urls": ["https://a.example"]}});
/// let path = FieldPath::parse("session.startup_urls[0]").unwrap();
/// assert_eq!(path.resolve(&doc), Some(&json!("https://a.example")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parses a dotted/bracketed key path.
    ///
    /// # Errors
    ///
    /// Returns `PrefMacError::InvalidPath` for empty paths, empty segments,
    /// unterminated brackets or quotes, and non-numeric unquoted indices.
    pub fn parse(raw: &str) -> Result<Self> {
        let segments = parse_segments(raw)?;
        Ok(FieldPath {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Builds a path from segments, keeping `raw` as its text.
    pub(crate) fn from_segments(raw: &str, segments: Vec<Segment>) -> Self {
        FieldPath {
            raw: raw.to_string(),
            segments,
        }
    }

    /// The text this path was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Looks up the value at this path.
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(document, |node, segment| match (segment, node) {
                (Segment::Key(k), Value::Object(map)) => map.get(k),
                (Segment::Index(i), Value::Array(items)) => items.get(*i),
                _ => None,
            })
    }

    /// Mutable lookup of the value at this path.
    pub fn resolve_mut<'a>(&self, document: &'a mut Value) -> Option<&'a mut Value> {
        let mut node = document;
        for segment in &self.segments {
            node = match (segment, node) {
                (Segment::Key(k), Value::Object(map)) => map.get_mut(k)?,
                (Segment::Index(i), Value::Array(items)) => items.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Stores `value` at this path, creating missing intermediate objects.
    ///
    /// # Errors
    ///
    /// Returns `PrefMacError::InvalidPath` when an intermediate node exists
    /// but is not a container, or an index is out of range.
    pub fn set(&self, document: &mut Value, value: Value) -> Result<()> {
        let Some((last, parents)) = self.segments.split_last() else {
            *document = value;
            return Ok(());
        };

        let mut node = document;
        for segment in parents {
            node = self.child_or_insert(node, segment)?;
        }

        match (last, node) {
            (Segment::Key(k), Value::Object(map)) => {
                map.insert(k.clone(), value);
                Ok(())
            }
            (Segment::Index(i), Value::Array(items)) if *i < items.len() => {
                items[*i] = value;
                Ok(())
            }
            (Segment::Index(i), Value::Array(_)) => Err(PrefMacError::invalid_path(
                &self.raw,
                format!("index {i} out of range"),
            )),
            _ => Err(PrefMacError::invalid_path(
                &self.raw,
                "parent is not a container",
            )),
        }
    }

    fn child_or_insert<'a>(&self, node: &'a mut Value, segment: &Segment) -> Result<&'a mut Value> {
        match (segment, node) {
            (Segment::Key(k), Value::Object(map)) => Ok(map
                .entry(k.clone())
                .or_insert_with(|| Value::Object(Map::new()))),
            (Segment::Index(i), Value::Array(items)) => items.get_mut(*i).ok_or_else(|| {
                PrefMacError::invalid_path(&self.raw, format!("index {i} out of range"))
            }),
            (Segment::Key(k), _) => Err(PrefMacError::invalid_path(
                &self.raw,
                format!("'{k}' is nested under a non-object value"),
            )),
            (Segment::Index(i), _) => Err(PrefMacError::invalid_path(
                &self.raw,
                format!("index {i} is applied to a non-array value"),
            )),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for FieldPath {
    type Err = PrefMacError;

    fn from_str(s: &str) -> Result<Self> {
        FieldPath::parse(s)
    }
}

fn parse_segments(raw: &str) -> Result<Vec<Segment>> {
    if raw.is_empty() {
        return Err(PrefMacError::invalid_path(raw, "path is empty"));
    }

    let mut segments = Vec::new();
    let mut chars = raw.chars().peekable();
    // A separator has been consumed and a segment must follow.
    let mut expect_segment = true;

    while let Some(&ch) = chars.peek() {
        match ch {
            '.' => {
                if expect_segment {
                    return Err(PrefMacError::invalid_path(raw, "empty segment"));
                }
                chars.next();
                expect_segment = true;
            }
            '[' => {
                chars.next();
                segments.push(parse_bracket(raw, &mut chars)?);
                expect_segment = false;
            }
            _ => {
                if !expect_segment {
                    return Err(PrefMacError::invalid_path(
                        raw,
                        "missing '.' between segments",
                    ));
                }
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '.' || c == '[' {
                        break;
                    }
                    key.push(c);
                    chars.next();
                }
                segments.push(Segment::Key(key));
                expect_segment = false;
            }
        }
    }

    if expect_segment {
        return Err(PrefMacError::invalid_path(raw, "path ends with '.'"));
    }
    Ok(segments)
}

fn parse_bracket(raw: &str, chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Segment> {
    let segment = match chars.peek() {
        Some(&quote @ ('\'' | '"')) => {
            chars.next();
            let mut key = String::new();
            loop {
                match chars.next() {
                    Some(c) if c == quote => break,
                    Some(c) => key.push(c),
                    None => {
                        return Err(PrefMacError::invalid_path(raw, "unterminated quoted key"))
                    }
                }
            }
            Segment::Key(key)
        }
        _ => {
            let mut digits = String::new();
            while let Some(&c) = chars.peek() {
                if c == ']' {
                    break;
                }
                digits.push(c);
                chars.next();
            }
            let index = digits.parse::<usize>().map_err(|_| {
                PrefMacError::invalid_path(raw, format!("'{digits}' is not an array index"))
            })?;
            Segment::Index(index)
        }
    };

    match chars.next() {
        Some(']') => Ok(segment),
        _ => Err(PrefMacError::invalid_path(raw, "expected ']'")),
    }
}
