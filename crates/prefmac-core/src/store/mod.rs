//! # Tag Store Adapters
//!
//! Computed tags live in one of two backends:
//!
//! | Backend | Field entries | Aggregate entry |
//! |---------|---------------|-----------------|
//! | [`DocumentTagStore`] | nested under `protection.macs` in a JSON document | `protection.super_mac` |
//! | [`SecureTagStore`] | one entry per path in the profile namespace | `super_mac` in the namespace root |
//!
//! The reconciler talks to both through [`TagStore`] and never learns which
//! one it holds. Neither backend locks; callers serialize runs.

mod document;
mod secure;

pub use document::{DocumentTagStore, DEFAULT_MACS_PATH, DEFAULT_SUPER_MAC_PATH};
pub use secure::{SecureTagStore, DEFAULT_NAMESPACE_ROOT, DEFAULT_PROFILE};

use crate::models::{Result, TagSet};
use serde::{Deserialize, Serialize};

/// Name of the aggregate entry.
pub const SUPER_MAC_KEY: &str = "super_mac";

/// Which backend a store is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Reserved sub-object of a JSON document.
    #[default]
    Document,
    /// Process-external key-value store.
    SecureStore,
}

/// Read/write access to stored tags.
///
/// Writes must be idempotent: writing the tag a path already holds succeeds
/// and leaves the store unchanged.
pub trait TagStore {
    /// Backend kind, for reporting.
    fn backend(&self) -> StoreBackend;

    /// Stored tag for `path`, if any.
    fn read(&self, path: &str) -> Result<Option<String>>;

    /// Stores `tag` for `path`.
    fn write(&mut self, path: &str, tag: &str) -> Result<()>;

    /// Stored aggregate tag, if any.
    fn read_aggregate(&self) -> Result<Option<String>>;

    /// Stores the aggregate tag.
    fn write_aggregate(&mut self, tag: &str) -> Result<()>;

    /// Stores every tag in `tags` and then the aggregate.
    ///
    /// Backends that can write a group of entries in one step override this
    /// so a failed write does not leave half a tag set behind.
    fn write_tags(&mut self, tags: &TagSet, aggregate: &str) -> Result<()> {
        for (path, tag) in tags {
            self.write(path, tag)?;
        }
        self.write_aggregate(aggregate)
    }

    /// Every field path that currently has a stored tag, sorted.
    fn stored_paths(&self) -> Result<Vec<String>>;

    /// Makes previous writes durable. Document stores are persisted by the
    /// caller, so the default does nothing.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
