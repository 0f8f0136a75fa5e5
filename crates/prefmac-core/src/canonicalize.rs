//! # Protected Field Canonicalization
//!
//! The browser hashes each protected preference in the exact textual form its
//! own JSON writer produces. To reproduce the tag, the recomputed text must be
//! byte-identical. This module produces that text.
//!
//! ## Threat Model
//!
//! Canonicalization defends against:
//!
//! - **Benign Re-serialization**: Pretty-printed or re-indented documents
//!   hash identically because the fragment is always re-emitted compactly.
//! - **HTML Defanging Drift**: The browser writes `<` as `\u003C`. Omitting the
//!   escape produces a different tag for any value containing markup.
//!
//! ## Canonical Form
//!
//! 1. **Whitespace**: None outside strings.
//! 2. **Object Keys**: Emitted in the order they are stored in the document.
//! 3. **Strings**: Standard JSON escaping (`"`, `\`, control characters).
//! 4. **`<`**: Replaced by the six characters `\u003C`, everywhere.
//! 5. Nothing else is escaped; non-ASCII text stays as UTF-8.
//!
//! Key order as stored is preserved because the document is parsed with
//! `serde_json`'s `preserve_order` feature. Floats survive the parse and
//! re-emit unchanged only with its `float_roundtrip` feature.
//!
//! ## Example
//!
//! ```rust
//! use prefmac_core::canonicalize::{canonical_json, canonicalize};
//! use serde_json::json;
//!
//! let doc = json!({"session": {"startup_urls": ["https://a.example/<x>"]}});
//!
//! let field = canonicalize(&doc, "session.startup_urls").unwrap();
//! assert_eq!(field.canonical_content, r#"["https://a.example/\u003Cx>"]"#);
//!
//! assert_eq!(canonical_json(&json!({"b": 1, "a": 2})).unwrap(), r#"{"b":1,"a":2}"#);
//! ```

use crate::models::{AggregateLayout, PrefMacError, ProtectedField, Result, TagSet};
use crate::path::FieldPath;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Escape sequence the browser's writer substitutes for `<`.
pub const LT_ESCAPE: &str = "\\u003C";

/// Extracts the value at `path` and renders its canonical content.
///
/// # Errors
///
/// - `PrefMacError::FieldNotFound` when `path` does not resolve.
/// - `PrefMacError::InvalidPath` when `path` cannot be parsed.
pub fn canonicalize(document: &Value, path: &str) -> Result<ProtectedField> {
    let field_path = FieldPath::parse(path)?;
    canonicalize_path(document, &field_path)
}

/// Same as [`canonicalize`] for an already parsed path.
pub fn canonicalize_path(document: &Value, path: &FieldPath) -> Result<ProtectedField> {
    let value = path
        .resolve(document)
        .ok_or_else(|| PrefMacError::FieldNotFound(path.as_str().to_string()))?;

    Ok(ProtectedField {
        path: path.as_str().to_string(),
        canonical_content: canonical_json(value)?,
        tag: None,
    })
}

/// Serializes `value` compactly and escapes every `<`.
pub fn canonical_json(value: &Value) -> Result<String> {
    let serialized = serde_json::to_string(value)?;
    Ok(escape_lt(&serialized))
}

/// Replaces each literal `<` with `\u003C`, leaving every other byte alone.
pub fn escape_lt(text: &str) -> String {
    text.replace('<', LT_ESCAPE)
}

/// Serializes a tag set as the aggregate tag's input.
///
/// Keys are sorted by byte order at every level regardless of layout.
///
/// # Errors
///
/// Returns `PrefMacError::InvalidPath` when a path cannot be parsed or, in
/// the nested layout, when one path is a prefix of another (a tag cannot be
/// both a leaf and a container).
pub fn canonical_tag_set(tags: &TagSet, layout: AggregateLayout) -> Result<String> {
    let value = match layout {
        AggregateLayout::Flat => Value::Object(
            tags.iter()
                .map(|(path, tag)| (path.clone(), Value::String(tag.clone())))
                .collect::<Map<String, Value>>(),
        ),
        AggregateLayout::Nested => nest_tags(tags)?.into_value(),
    };
    canonical_json(&value)
}

/// Intermediate tree so keys can be sorted at each level before the
/// `serde_json` map (which keeps insertion order) is built.
enum TagNode {
    Leaf(String),
    Branch(BTreeMap<String, TagNode>),
}

impl TagNode {
    fn into_value(self) -> Value {
        match self {
            TagNode::Leaf(tag) => Value::String(tag),
            TagNode::Branch(children) => Value::Object(
                children
                    .into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect(),
            ),
        }
    }
}

fn nest_tags(tags: &TagSet) -> Result<TagNode> {
    let mut root = BTreeMap::new();

    for (raw, tag) in tags {
        let path = FieldPath::parse(raw)?;
        let Some((last, parents)) = path.segments().split_last() else {
            continue;
        };

        let mut level = &mut root;
        for segment in parents {
            let node = level
                .entry(segment.as_key())
                .or_insert_with(|| TagNode::Branch(BTreeMap::new()));
            level = match node {
                TagNode::Branch(children) => children,
                TagNode::Leaf(_) => {
                    return Err(PrefMacError::invalid_path(
                        raw,
                        "nested under another protected path",
                    ))
                }
            };
        }

        if level
            .insert(last.as_key(), TagNode::Leaf(tag.clone()))
            .is_some()
        {
            return Err(PrefMacError::invalid_path(
                raw,
                "collides with another protected path",
            ));
        }
    }

    Ok(TagNode::Branch(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_scalars() {
        assert_eq!(canonical_json(&json!(null)).unwrap(), "null");
        assert_eq!(canonical_json(&json!(true)).unwrap(), "true");
        assert_eq!(canonical_json(&json!(4)).unwrap(), "4");
        assert_eq!(canonical_json(&json!("x")).unwrap(), r#""x""#);
    }

    #[test]
    fn test_every_lt_escaped() {
        let value = json!({"a<": ["<", "<<b>", {"c": "x<y"}]});
        let out = canonical_json(&value).unwrap();

        assert!(!out.contains('<'));
        assert_eq!(out.matches(LT_ESCAPE).count(), 5);
        assert_eq!(
            out,
            r#"{"a\u003C":["\u003C","\u003C\u003Cb>",{"c":"x\u003Cy"}]}"#
        );
    }

    #[test]
    fn test_only_lt_altered() {
        let value = json!({"html": "<a href=\"/x\">&amp;</a>", "u": "é/\u{2028}"});
        let plain = serde_json::to_string(&value).unwrap();
        let canonical = canonical_json(&value).unwrap();

        assert_eq!(canonical.replace(LT_ESCAPE, "<"), plain);
        assert!(canonical.contains('>'));
        assert!(canonical.contains('&'));
        assert!(canonical.contains('é'));
    }

    #[test]
    fn test_without_lt_is_default_serialization() {
        let values = [
            json!({"restore_on_startup": 4, "startup_urls": ["https://example.com/"]}),
            json!([1.5, -0.25, 1e300, "quote\"slash\\"]),
            json!("line\nbreak\ttab"),
        ];
        for value in values {
            assert_eq!(
                canonical_json(&value).unwrap(),
                serde_json::to_string(&value).unwrap()
            );
        }
    }

    #[test]
    fn test_parsed_floats_reproduced_exactly() {
        for literal in [
            "3.9713457702896093",
            "0.0015939993976228119",
            "472749088.66546685",
            "13350293876.5",
        ] {
            let doc: Value = serde_json::from_str(&format!(r#"{{"v":{literal}}}"#)).unwrap();
            let field = canonicalize(&doc, "v").unwrap();
            assert_eq!(field.canonical_content, literal);
        }
    }

    #[test]
    fn test_key_order_as_stored() {
        let doc: Value = serde_json::from_str(r#"{"z": 1, "a": {"y": 2, "b": 3}}"#).unwrap();
        assert_eq!(
            canonical_json(&doc).unwrap(),
            r#"{"z":1,"a":{"y":2,"b":3}}"#
        );
    }

    #[test]
    fn test_pretty_printed_document_hashes_the_same() {
        let compact: Value = serde_json::from_str(r#"{"homepage":"https://x/"}"#).unwrap();
        let pretty: Value =
            serde_json::from_str("{\n    \"homepage\" :  \"https://x/\"\n}\n").unwrap();
        assert_eq!(
            canonicalize(&compact, "homepage").unwrap(),
            canonicalize(&pretty, "homepage").unwrap()
        );
    }

    #[test]
    fn test_canonicalize_field() {
        let doc = json!({"browser": {"show_home_button": true}});
        let field = canonicalize(&doc, "browser.show_home_button").unwrap();
        assert_eq!(field.path, "browser.show_home_button");
        assert_eq!(field.canonical_content, "true");
    }

    #[test]
    fn test_canonicalize_missing_field() {
        let doc = json!({"browser": {}});
        let err = canonicalize(&doc, "missing.field").unwrap_err();
        assert!(matches!(err, PrefMacError::FieldNotFound(p) if p == "missing.field"));
    }

    #[test]
    fn test_canonicalize_keeps_bracketed_path_text() {
        let doc = json!({"session": {"restore_on_startup": 5}});
        let field = canonicalize(&doc, "['session']['restore_on_startup']").unwrap();
        assert_eq!(field.path, "['session']['restore_on_startup']");
        assert_eq!(field.canonical_content, "5");
    }

    #[test]
    fn test_tag_set_nested_layout() {
        let tags: TagSet = [
            ("homepage", "BB"),
            ("browser.show_home_button", "AA"),
            ("a-b", "CC"),
            ("a.z", "DD"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            canonical_tag_set(&tags, AggregateLayout::Nested).unwrap(),
            r#"{"a":{"z":"DD"},"a-b":"CC","browser":{"show_home_button":"AA"},"homepage":"BB"}"#
        );
    }

    #[test]
    fn test_tag_set_flat_layout() {
        let tags: TagSet = [("homepage", "BB"), ("browser.show_home_button", "AA")]
            .into_iter()
            .collect();

        assert_eq!(
            canonical_tag_set(&tags, AggregateLayout::Flat).unwrap(),
            r#"{"browser.show_home_button":"AA","homepage":"BB"}"#
        );
    }

    #[test]
    fn test_tag_set_nested_conflict() {
        let tags: TagSet = [("media", "AA"), ("media.cdm", "BB")].into_iter().collect();
        let err = canonical_tag_set(&tags, AggregateLayout::Nested).unwrap_err();
        assert!(matches!(err, PrefMacError::InvalidPath { .. }));
    }

    #[test]
    fn test_empty_tag_set() {
        let tags = TagSet::new();
        assert_eq!(canonical_tag_set(&tags, AggregateLayout::Nested).unwrap(), "{}");
        assert_eq!(canonical_tag_set(&tags, AggregateLayout::Flat).unwrap(), "{}");
    }
}
