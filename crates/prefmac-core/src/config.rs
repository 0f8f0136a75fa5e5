//! Configuration types for prefmac.
//!
//! Every section has defaults, so a TOML file only needs the keys it
//! changes:
//!
//! ```toml
//! [seed]
//! path = "C:/Program Files/Google/Chrome/Application/120.0.6099.71/resources.pak"
//!
//! [store]
//! backend = "secure_store"
//! db_path = "prefmac.db"
//! ```

use crate::identity::{FixedIdentitySource, PlatformIdentitySource, SystemIdentitySource};
use crate::models::{AggregateLayout, PrefMacError, Result, DEFAULT_PROTECTED_PATHS};
use crate::reconcile::{ReconcileMode, ReconcileOptions};
use crate::seed::SeedEncoding;
use crate::store::{StoreBackend, DEFAULT_MACS_PATH, DEFAULT_NAMESPACE_ROOT, DEFAULT_PROFILE, DEFAULT_SUPER_MAC_PATH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefMacConfig {
    /// Machine identity inputs.
    pub identity: IdentityConfig,

    /// Seed file location and key encoding.
    pub seed: SeedConfig,

    /// Where tags are kept.
    pub store: StoreConfig,

    /// Which fields are protected.
    pub protected: ProtectedConfig,
}

/// Machine identity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Account whose SID is looked up. Defaults to the machine name.
    pub account_name: Option<String>,

    /// Volume whose serial number is queried.
    pub volume_root: String,

    /// Fixed SID; together with `volume_serial` replaces the live queries.
    pub sid: Option<String>,

    /// Fixed volume serial number.
    pub volume_serial: Option<u32>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            account_name: None,
            volume_root: "C:\\".to_string(),
            sid: None,
            volume_serial: None,
        }
    }
}

/// Seed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// File whose first 64 bytes are the seed.
    pub path: PathBuf,

    /// How the seed becomes the HMAC key.
    pub encoding: SeedEncoding,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("resources.pak"),
            encoding: SeedEncoding::default(),
        }
    }
}

/// Tag store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Which backend holds the tags.
    pub backend: StoreBackend,

    /// Per-field tag object inside the tag document.
    pub macs_path: String,

    /// Aggregate tag inside the tag document.
    pub super_mac_path: String,

    /// Database directory for the secure store.
    pub db_path: PathBuf,

    /// Secure store namespace root.
    pub namespace_root: String,

    /// Secure store profile namespace.
    pub profile: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            macs_path: DEFAULT_MACS_PATH.to_string(),
            super_mac_path: DEFAULT_SUPER_MAC_PATH.to_string(),
            db_path: PathBuf::from("./prefmac.db"),
            namespace_root: DEFAULT_NAMESPACE_ROOT.to_string(),
            profile: DEFAULT_PROFILE.to_string(),
        }
    }
}

/// Protected field configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectedConfig {
    /// Paths that are tagged.
    pub paths: Vec<String>,

    /// Tag set layout for the aggregate.
    pub aggregate_layout: AggregateLayout,

    /// Also process paths the store already has tags for.
    pub include_stored_paths: bool,
}

impl Default for ProtectedConfig {
    fn default() -> Self {
        Self {
            paths: DEFAULT_PROTECTED_PATHS.iter().map(|p| p.to_string()).collect(),
            aggregate_layout: AggregateLayout::default(),
            include_stored_paths: false,
        }
    }
}

impl PrefMacConfig {
    /// Parses a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns `PrefMacError::Config` on malformed TOML or unknown values.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PrefMacError::Config(e.to_string()))
    }

    /// Reads and parses a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PrefMacError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PrefMacError::Config(e.to_string()))
    }

    /// Identity source selected by the identity section.
    ///
    /// # Errors
    ///
    /// Returns `PrefMacError::Config` when only one of `sid` and
    /// `volume_serial` is set.
    pub fn identity_source(&self) -> Result<Box<dyn PlatformIdentitySource>> {
        let identity = &self.identity;
        match (&identity.sid, identity.volume_serial) {
            (Some(sid), Some(serial)) => Ok(Box::new(FixedIdentitySource::new(sid.clone(), serial))),
            (None, None) => Ok(Box::new(SystemIdentitySource::new(
                identity.account_name.clone(),
                identity.volume_root.clone(),
            ))),
            _ => Err(PrefMacError::Config(
                "identity.sid and identity.volume_serial must be set together".to_string(),
            )),
        }
    }

    /// Reconciler options for a run in `mode`.
    pub fn reconcile_options(&self, mode: ReconcileMode) -> ReconcileOptions {
        ReconcileOptions {
            mode,
            seed_encoding: self.seed.encoding,
            aggregate_layout: self.protected.aggregate_layout,
            paths: self.protected.paths.clone(),
            include_stored_paths: self.protected.include_stored_paths,
        }
    }
}
