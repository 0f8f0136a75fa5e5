//! # Core Data Models for Preference Integrity Tags
//!
//! This module defines the fundamental types shared by every stage of the
//! tag pipeline: the protected field produced by the canonicalizer, the
//! path-to-tag map that feeds the aggregate ("super") tag, and the error
//! taxonomy used by the reconciler to separate per-field findings from
//! run-aborting failures.
//!
//! ## Threat Model
//!
//! The types in this module help defend against:
//!
//! - **Silent Partial Writes**: `PrefMacError::is_fatal` draws a hard line
//!   between findings that are recorded and failures that abort the run.
//! - **Order-Dependent Aggregates**: `TagSet` is backed by a sorted map so the
//!   aggregate input never depends on hash-map enumeration order.
//! - **Layout Confusion**: `AggregateLayout` names the exact shape the tag set
//!   is serialized in before it is hashed.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::path::PathBuf;
use thiserror::Error;

/// Number of seed bytes read from the resource container file.
pub const SEED_LEN: usize = 64;

/// Length of a rendered tag: HMAC-SHA256 output as hex.
pub const TAG_HEX_LEN: usize = 64;

/// Preference paths the browser protects with a per-field tag.
pub const DEFAULT_PROTECTED_PATHS: &[&str] = &[
    "browser.show_home_button",
    "default_search_provider_data.template_url_data",
    "enterprise_signin.policy_recovery_token",
    "google.services.account_id",
    "google.services.last_account_id",
    "google.services.last_signed_in_username",
    "google.services.last_username",
    "homepage",
    "homepage_is_newtabpage",
    "media.cdm.origin_data",
    "media.storage_id_salt",
    "pinned_tabs",
    "prefs.preference_reset_time",
    "safebrowsing.incidents_sent",
    "search_provider_overrides",
    "session.restore_on_startup",
    "session.startup_urls",
];

/// A protected preference extracted from the configuration document.
///
/// `canonical_content` is the exact text fed to the MAC after `path`; it is
/// never re-parsed or re-formatted once produced. `tag` stays `None` until
/// [`TagComputer::sign`](crate::tag::TagComputer::sign) fills it.
///
/// # Example
///
/// ```rust
/// use prefmac_core::canonicalize::canonicalize;
/// use serde_json::json;
///
/// let doc = json!({"homepage": "<b>"});
/// let field = canonicalize(&doc, "homepage").unwrap();
/// assert_eq!(field.path, "homepage");
/// assert_eq!(field.canonical_content, r#""\u003Cb>""#);
/// assert_eq!(field.tag, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedField {
    /// Key path as configured (dotted or bracketed).
    pub path: String,

    /// Compact JSON of the value with `<` escaped as `\u003C`.
    pub canonical_content: String,

    /// HMAC-SHA256 tag over the field, uppercase hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Shape the tag set takes when it is serialized for the aggregate tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateLayout {
    /// Paths split on their segments into nested objects, keys sorted at
    /// every level. Mirrors the reserved `protection.macs` sub-object.
    #[default]
    Nested,

    /// One flat object of `path -> tag`, keys sorted.
    Flat,
}

/// Mapping from protected field path to its tag.
///
/// Iteration is always in ascending path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet {
    entries: BTreeMap<String, String>,
}

impl TagSet {
    /// Creates an empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the tag for `path`, returning the previous tag.
    pub fn insert(&mut self, path: impl Into<String>, tag: impl Into<String>) -> Option<String> {
        self.entries.insert(path.into(), tag.into())
    }

    /// Returns the tag stored for `path`.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Returns true when `path` has an entry.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(path, tag)` pairs in ascending path order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<P: Into<String>, T: Into<String>> FromIterator<(P, T)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (P, T)>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for (path, tag) in iter {
            set.insert(path, tag);
        }
        set
    }
}

/// Errors raised by the tag subsystem.
///
/// `FieldNotFound` and `TagMissing` are per-field findings; every other
/// variant aborts a reconciliation run. See [`PrefMacError::is_fatal`].
#[derive(Debug, Error)]
pub enum PrefMacError {
    /// The security identifier or volume serial could not be obtained.
    #[error("machine identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// The seed file is absent or shorter than the seed length.
    #[error("seed source missing at {}: {reason}", path.display())]
    SeedSourceMissing {
        /// Seed file that was requested.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The field path does not resolve in the document.
    #[error("field not found in document: {0}")]
    FieldNotFound(String),

    /// The store holds no tag for the field.
    #[error("no stored tag for field: {0}")]
    TagMissing(String),

    /// The tag store could not be opened or written.
    #[error("tag store unavailable: {0}")]
    StoreUnavailable(String),

    /// The MAC could not be keyed from the seed.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// The configuration document is not valid JSON.
    #[error("document parse error: {0}")]
    DocumentParse(String),

    /// A key path is malformed or collides with another path.
    #[error("invalid field path '{path}': {reason}")]
    InvalidPath {
        /// Offending path text.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedded database failure after the store was opened.
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Failed to serialize or deserialize data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrefMacError {
    /// Returns false for findings that are recorded per field and do not
    /// stop a reconciliation run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::FieldNotFound(_) | Self::TagMissing(_))
    }

    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for tag subsystem operations.
pub type Result<T> = std::result::Result<T, PrefMacError>;
