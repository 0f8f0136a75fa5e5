//! Tags embedded in a JSON document.
//!
//! The browser keeps per-field tags in a reserved object that mirrors the
//! preference tree, and the aggregate next to it:
//!
//! ```text
//! "protection": {
//!     "macs": {
//!         "browser": { "show_home_button": "9A0B..." },
//!         "homepage": "41C7..."
//!     },
//!     "super_mac": "E0F1..."
//! }
//! ```

use super::{StoreBackend, TagStore};
use crate::models::{PrefMacError, Result};
use crate::path::FieldPath;
use serde_json::Value;
use tracing::{debug, warn};

/// Default location of the per-field tag object.
pub const DEFAULT_MACS_PATH: &str = "protection.macs";

/// Default location of the aggregate tag.
pub const DEFAULT_SUPER_MAC_PATH: &str = "protection.super_mac";

/// Tag store over an owned JSON document.
///
/// Writes modify the document in memory. Take it back with
/// [`DocumentTagStore::into_document`] and persist it.
///
/// # Example
///
/// ```rust
/// use prefmac_core::store::{DocumentTagStore, TagStore};
/// use serde_json::json;
///
/// let mut store = DocumentTagStore::new(json!({})).unwrap();
/// store.write("browser.show_home_button", "AA").unwrap();
/// store.write_aggregate("BB").unwrap();
///
/// let doc = store.into_document();
/// assert_eq!(doc["protection"]["macs"]["browser"]["show_home_button"], "AA");
/// assert_eq!(doc["protection"]["super_mac"], "BB");
/// ```
#[derive(Debug, Clone)]
pub struct DocumentTagStore {
    document: Value,
    macs_path: FieldPath,
    super_mac_path: FieldPath,
}

impl DocumentTagStore {
    /// Wraps `document` using the default reserved locations.
    pub fn new(document: Value) -> Result<Self> {
        Self::with_paths(document, DEFAULT_MACS_PATH, DEFAULT_SUPER_MAC_PATH)
    }

    /// Wraps `document` with explicit reserved locations.
    ///
    /// # Errors
    ///
    /// Returns `PrefMacError::InvalidPath` if either location cannot be
    /// parsed, and `PrefMacError::StoreUnavailable` if the document root is
    /// not an object.
    pub fn with_paths(document: Value, macs_path: &str, super_mac_path: &str) -> Result<Self> {
        if !document.is_object() {
            return Err(PrefMacError::StoreUnavailable(
                "tag document root is not an object".to_string(),
            ));
        }
        Ok(Self {
            document,
            macs_path: FieldPath::parse(macs_path)?,
            super_mac_path: FieldPath::parse(super_mac_path)?,
        })
    }

    /// The document in its current state.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Releases the document with all writes applied.
    pub fn into_document(self) -> Value {
        self.document
    }

    /// Full path of the tag entry for `path` inside the document.
    fn entry_path(&self, path: &str) -> Result<FieldPath> {
        let field = FieldPath::parse(path)?;
        let mut joined = self.macs_path.segments().to_vec();
        joined.extend_from_slice(field.segments());
        Ok(FieldPath::from_segments(path, joined))
    }
}

impl TagStore for DocumentTagStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Document
    }

    fn read(&self, path: &str) -> Result<Option<String>> {
        let entry = self.entry_path(path)?;
        Ok(entry
            .resolve(&self.document)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn write(&mut self, path: &str, tag: &str) -> Result<()> {
        let entry = self.entry_path(path)?;
        entry.set(&mut self.document, Value::String(tag.to_string()))?;
        debug!(path, "wrote embedded tag");
        Ok(())
    }

    fn read_aggregate(&self) -> Result<Option<String>> {
        Ok(self
            .super_mac_path
            .resolve(&self.document)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn write_aggregate(&mut self, tag: &str) -> Result<()> {
        self.super_mac_path
            .set(&mut self.document, Value::String(tag.to_string()))?;
        debug!("wrote embedded aggregate tag");
        Ok(())
    }

    fn stored_paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        if let Some(macs) = self.macs_path.resolve(&self.document) {
            collect_leaf_paths(macs, &mut String::new(), &mut paths);
        }
        paths.sort();
        Ok(paths)
    }
}

/// Walks the tag object, recording the path of every string leaf.
fn collect_leaf_paths(node: &Value, prefix: &mut String, out: &mut Vec<String>) {
    match node {
        Value::String(_) if !prefix.is_empty() => out.push(prefix.clone()),
        Value::Object(map) => {
            for (key, child) in map {
                let restore = prefix.len();
                if push_key(prefix, key) {
                    collect_leaf_paths(child, prefix, out);
                } else {
                    warn!(key = %key, "stored tag key cannot be written as a path");
                }
                prefix.truncate(restore);
            }
        }
        _ => {}
    }
}

/// Appends `key` to a path, bracketed when dotted form would split or
/// misread it. Returns false for a key holding both quote characters.
fn push_key(prefix: &mut String, key: &str) -> bool {
    let plain = !key.is_empty() && !key.contains(&['.', '['][..]);
    if plain {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(key);
        return true;
    }

    let quote = if !key.contains('\'') {
        '\''
    } else if !key.contains('"') {
        '"'
    } else {
        return false;
    };
    prefix.push('[');
    prefix.push(quote);
    prefix.push_str(key);
    prefix.push(quote);
    prefix.push(']');
    true
}
