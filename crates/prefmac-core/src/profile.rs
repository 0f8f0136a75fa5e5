//! The profile-level facade.
//!
//! [`ProfileSigner`] is the entry point the CLI uses. It owns the
//! configuration and identity source, and for each run:
//!
//! 1. locks the profile documents,
//! 2. loads the value document (and the tag document when separate),
//! 3. opens the configured tag store,
//! 4. runs the [`Reconciler`],
//! 5. saves whatever the run changed, keeping `.bak` copies.
//!
//! After a startup page edit the browser's `Cache` and `Code Cache`
//! directories are removed when the profile directory is known, so the
//! browser does not serve the old start page from cache.

use crate::config::PrefMacConfig;
use crate::document::{load_document, save_document, DocumentLock};
use crate::identity::{MachineIdentity, PlatformIdentitySource};
use crate::models::Result;
use crate::reconcile::{ReconcileMode, ReconcileReport, Reconciler};
use crate::startup::set_startup_page;
use crate::store::{DocumentTagStore, SecureTagStore, StoreBackend};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Cache directories cleared after the startup page changes.
pub const BROWSER_CACHE_DIRS: &[&str] = &["Cache", "Code Cache"];

/// The documents of one browser profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFiles {
    /// Document holding the preference values.
    pub preferences: PathBuf,

    /// Document holding embedded tags, when not the value document itself.
    pub secure_preferences: Option<PathBuf>,

    /// Profile directory, when the documents live in one.
    pub profile_dir: Option<PathBuf>,
}

impl ProfileFiles {
    /// Values and tags in one document.
    pub fn single(preferences: impl Into<PathBuf>) -> Self {
        Self {
            preferences: preferences.into(),
            secure_preferences: None,
            profile_dir: None,
        }
    }

    /// Values and tags in separate documents.
    pub fn split(preferences: impl Into<PathBuf>, secure_preferences: impl Into<PathBuf>) -> Self {
        Self {
            preferences: preferences.into(),
            secure_preferences: Some(secure_preferences.into()),
            profile_dir: None,
        }
    }

    /// The conventional `Preferences` / `Secure Preferences` pair inside a
    /// profile directory.
    pub fn in_profile_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self::split(dir.join("Preferences"), dir.join("Secure Preferences"))
            .with_profile_dir(dir)
    }

    /// Same documents, recorded as belonging to profile directory `dir`.
    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = Some(dir.into());
        self
    }

    /// Document the embedded tag store reads and writes.
    pub fn tag_document(&self) -> &Path {
        self.secure_preferences.as_deref().unwrap_or(&self.preferences)
    }
}

/// Verifies and re-signs profile documents.
///
/// # Example
///
/// ```rust,no_run
/// use prefmac_core::config::PrefMacConfig;
/// use prefmac_core::profile::{ProfileFiles, ProfileSigner};
///
/// let signer = ProfileSigner::new(PrefMacConfig::load("prefmac.toml")?)?;
/// let files = ProfileFiles::in_profile_dir("C:/Users/me/AppData/Local/Google/Chrome/User Data/Default");
///
/// let report = signer.verify(&files)?;
/// if !report.all_match() {
///     signer.apply(&files)?;
/// }
/// # Ok::<(), prefmac_core::PrefMacError>(())
/// ```
pub struct ProfileSigner {
    config: PrefMacConfig,
    identity_source: Box<dyn PlatformIdentitySource>,
}

impl ProfileSigner {
    /// Signer using the identity source the configuration selects.
    ///
    /// # Errors
    ///
    /// Returns `PrefMacError::Config` for an inconsistent identity section.
    pub fn new(config: PrefMacConfig) -> Result<Self> {
        let identity_source = config.identity_source()?;
        Ok(Self {
            config,
            identity_source,
        })
    }

    /// Signer with an explicit identity source.
    pub fn with_identity_source(
        config: PrefMacConfig,
        identity_source: Box<dyn PlatformIdentitySource>,
    ) -> Self {
        Self {
            config,
            identity_source,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &PrefMacConfig {
        &self.config
    }

    /// Machine identity of this host.
    pub fn machine_identity(&self) -> Result<MachineIdentity> {
        MachineIdentity::derive(self.identity_source.as_ref())
    }

    /// Compares stored tags against computed ones. Writes nothing.
    pub fn verify(&self, files: &ProfileFiles) -> Result<ReconcileReport> {
        self.run(files, ReconcileMode::VerifyOnly, None)
    }

    /// Recomputes every tag and stores it.
    pub fn apply(&self, files: &ProfileFiles) -> Result<ReconcileReport> {
        self.run(files, ReconcileMode::Apply, None)
    }

    /// Sets the startup page and re-signs in the same run, then clears the
    /// profile's browser cache.
    ///
    /// Cache removal failures are logged and do not fail the call.
    pub fn set_startup(&self, files: &ProfileFiles, url: &str) -> Result<ReconcileReport> {
        let report = self.run(files, ReconcileMode::Apply, Some(url))?;
        if let Some(dir) = &files.profile_dir {
            clear_browser_cache(dir);
        }
        Ok(report)
    }

    fn run(
        &self,
        files: &ProfileFiles,
        mode: ReconcileMode,
        startup_url: Option<&str>,
    ) -> Result<ReconcileReport> {
        let _prefs_lock = DocumentLock::acquire(&files.preferences)?;
        let _tags_lock = match &files.secure_preferences {
            Some(path) => Some(DocumentLock::acquire(path)?),
            None => None,
        };

        let mut preferences = load_document(&files.preferences)?;
        if let Some(url) = startup_url {
            set_startup_page(&mut preferences, url)?;
        }

        let options = self.config.reconcile_options(mode);
        let mut reconciler =
            Reconciler::new(self.identity_source.as_ref(), &self.config.seed.path, options);

        match self.config.store.backend {
            StoreBackend::Document => {
                let tag_document = match &files.secure_preferences {
                    Some(path) => load_document(path)?,
                    None => preferences.clone(),
                };
                let mut store = DocumentTagStore::with_paths(
                    tag_document,
                    &self.config.store.macs_path,
                    &self.config.store.super_mac_path,
                )?;
                let report = reconciler.run(&preferences, &mut store)?;

                if files.secure_preferences.is_some() {
                    if startup_url.is_some() {
                        save_document(&files.preferences, &preferences, true)?;
                    }
                    if report.applied {
                        save_document(files.tag_document(), store.document(), true)?;
                    }
                } else if report.applied {
                    // The store's copy holds both the edited values and the tags.
                    save_document(&files.preferences, store.document(), true)?;
                }
                Ok(report)
            }
            StoreBackend::SecureStore => {
                let store_config = &self.config.store;
                let mut store = SecureTagStore::open(
                    &store_config.db_path,
                    &store_config.namespace_root,
                    &store_config.profile,
                )?;
                debug!(namespace = store.namespace(), "opened secure store");
                let report = reconciler.run(&preferences, &mut store)?;
                if startup_url.is_some() {
                    save_document(&files.preferences, &preferences, true)?;
                }
                info!(entries = store.len(), "secure store reconciled");
                Ok(report)
            }
        }
    }
}

/// Removes the cache directories of the profile at `dir`.
fn clear_browser_cache(dir: &Path) {
    for name in BROWSER_CACHE_DIRS {
        let cache = dir.join(name);
        if !cache.is_dir() {
            continue;
        }
        match std::fs::remove_dir_all(&cache) {
            Ok(()) => info!(path = %cache.display(), "removed browser cache"),
            Err(e) => warn!(path = %cache.display(), error = %e, "could not remove browser cache"),
        }
    }
}

impl std::fmt::Debug for ProfileSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileSigner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
