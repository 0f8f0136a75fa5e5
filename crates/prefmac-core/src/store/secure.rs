//! # Secure Key-Value Tag Store
//!
//! Some browser builds keep their tags outside the document, in a per-user
//! key-value namespace (`PreferenceMACs\<profile>` for fields, `PreferenceMACs`
//! for the aggregate). This backend keeps the same layout in a Sled database.
//!
//! ## Storage Structure
//!
//! | Tree | Key | Value |
//! |------|-----|-------|
//! | `<root>\<profile>` | field path | tag |
//! | `<root>` | `super_mac` | aggregate tag |
//!
//! ## Security Notes
//!
//! - The database directory should only be readable by the owning user.
//! - Opening the database is the only fatal failure; a missing entry is an
//!   ordinary `None`.
//!
//! ## References
//!
//! - Sled documentation: <https://sled.rs/>

use super::{StoreBackend, TagStore, SUPER_MAC_KEY};
use crate::models::{PrefMacError, Result, TagSet};
use std::path::Path;
use tracing::debug;

/// Default namespace root.
pub const DEFAULT_NAMESPACE_ROOT: &str = "PreferenceMACs";

/// Default profile namespace.
pub const DEFAULT_PROFILE: &str = "Default";

/// Tag store backed by a Sled database.
///
/// # Example
///
/// ```rust
/// use prefmac_core::store::{SecureTagStore, TagStore};
///
/// let mut store = SecureTagStore::temporary("PreferenceMACs", "Default").unwrap();
/// store.write("homepage", "AA").unwrap();
/// assert_eq!(store.read("homepage").unwrap().as_deref(), Some("AA"));
/// assert_eq!(store.read_aggregate().unwrap(), None);
/// ```
#[derive(Clone)]
pub struct SecureTagStore {
    /// The underlying Sled database.
    db: sled::Db,

    /// Per-field entries of one profile.
    fields: sled::Tree,

    /// Namespace root holding the aggregate entry.
    root: sled::Tree,

    namespace: String,
}

impl SecureTagStore {
    /// Opens or creates the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns `PrefMacError::StoreUnavailable` if the database or either
    /// namespace cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, namespace_root: &str, profile: &str) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            PrefMacError::StoreUnavailable(format!("{}: {e}", path.display()))
        })?;
        Self::from_db(db, namespace_root, profile)
    }

    /// Creates an in-memory store that is discarded on drop.
    pub fn temporary(namespace_root: &str, profile: &str) -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| PrefMacError::StoreUnavailable(e.to_string()))?;
        Self::from_db(db, namespace_root, profile)
    }

    fn from_db(db: sled::Db, namespace_root: &str, profile: &str) -> Result<Self> {
        let namespace = format!("{namespace_root}\\{profile}");
        let unavailable = |e: sled::Error| PrefMacError::StoreUnavailable(e.to_string());

        let fields = db.open_tree(namespace.as_bytes()).map_err(unavailable)?;
        let root = db.open_tree(namespace_root.as_bytes()).map_err(unavailable)?;

        Ok(SecureTagStore {
            db,
            fields,
            root,
            namespace,
        })
    }

    /// Namespace holding the field entries, e.g. `PreferenceMACs\Default`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of stored field entries.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field entries are stored.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn decode(bytes: sled::IVec) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| PrefMacError::StoreUnavailable(format!("stored tag is not UTF-8: {e}")))
}

impl TagStore for SecureTagStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::SecureStore
    }

    fn read(&self, path: &str) -> Result<Option<String>> {
        self.fields.get(path.as_bytes())?.map(decode).transpose()
    }

    fn write(&mut self, path: &str, tag: &str) -> Result<()> {
        self.fields.insert(path.as_bytes(), tag.as_bytes())?;
        debug!(namespace = %self.namespace, path, "wrote secure tag");
        Ok(())
    }

    fn read_aggregate(&self) -> Result<Option<String>> {
        self.root.get(SUPER_MAC_KEY.as_bytes())?.map(decode).transpose()
    }

    fn write_aggregate(&mut self, tag: &str) -> Result<()> {
        self.root.insert(SUPER_MAC_KEY.as_bytes(), tag.as_bytes())?;
        debug!(namespace = %self.namespace, "wrote secure aggregate tag");
        Ok(())
    }

    fn write_tags(&mut self, tags: &TagSet, aggregate: &str) -> Result<()> {
        let mut batch = sled::Batch::default();
        for (path, tag) in tags {
            batch.insert(path.as_bytes(), tag.as_bytes());
        }
        self.fields.apply_batch(batch)?;

        // The aggregate goes last so an interrupted write leaves it stale.
        let mut root_batch = sled::Batch::default();
        root_batch.insert(SUPER_MAC_KEY.as_bytes(), aggregate.as_bytes());
        self.root.apply_batch(root_batch)?;

        debug!(namespace = %self.namespace, fields = tags.len(), "wrote secure tag batch");
        Ok(())
    }

    fn stored_paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in self.fields.iter() {
            let (key, _) = entry?;
            paths.push(decode(key)?);
        }
        Ok(paths)
    }

    fn flush(&mut self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SecureTagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureTagStore")
            .field("namespace", &self.namespace)
            .field("entries", &self.len())
            .finish()
    }
}
