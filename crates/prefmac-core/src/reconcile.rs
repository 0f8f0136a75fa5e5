//! # Reconciler - Tag Recomputation and Verification
//!
//! The reconciler ties identity, seed, canonicalizer, tag computer and tag
//! store together into one pass over the protected fields.
//!
//! ## State Machine
//!
//! ```text
//!   Init ──► IdentityReady ──► FieldsProcessed ──► AggregateReady ──► Done
//!    │             │                  │                  │
//!    └─────────────┴──────────────────┴──────────────────┴──► Failed
//! ```
//!
//! | Transition | Work |
//! |------------|------|
//! | Init → IdentityReady | derive machine identity, extract seed |
//! | IdentityReady → FieldsProcessed | canonicalize + tag + compare each path |
//! | FieldsProcessed → AggregateReady | aggregate tag over the computed tag set |
//! | AggregateReady → Done | commit writes (apply mode), flush |
//!
//! A missing field or a missing stored tag is recorded in the report and the
//! pass continues. Any other error moves to `Failed` and is returned. Nothing
//! is written before `AggregateReady`, so a failed run leaves the store as it
//! found it.
//!
//! ## Modes
//!
//! - [`ReconcileMode::VerifyOnly`]: compare and report, never write.
//! - [`ReconcileMode::Apply`]: overwrite every stored tag with the computed
//!   one, re-signing a document after external edits.

use crate::canonicalize::canonicalize_path;
use crate::identity::{MachineIdentity, PlatformIdentitySource};
use crate::models::{
    AggregateLayout, PrefMacError, ProtectedField, Result, TagSet, DEFAULT_PROTECTED_PATHS,
};
use crate::path::FieldPath;
use crate::seed::{Seed, SeedEncoding};
use crate::store::{StoreBackend, TagStore};
use crate::tag::{tags_match, TagComputer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Label used for the aggregate entry in reports.
pub const AGGREGATE_LABEL: &str = "super_mac";

/// Whether a run may write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Compare only.
    #[default]
    VerifyOnly,
    /// Recompute and overwrite every tag.
    Apply,
}

/// Progress of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    /// Nothing computed yet.
    Init,
    /// Identity and seed are known.
    IdentityReady,
    /// Every configured field has been attempted.
    FieldsProcessed,
    /// The aggregate tag is computed.
    AggregateReady,
    /// Writes committed; terminal.
    Done,
    /// A fatal error ended the run; terminal.
    Failed,
}

impl ReconcileState {
    /// Returns true for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Non-fatal per-field finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldIssue {
    /// The path does not resolve in the document.
    FieldNotFound,
    /// The store has no tag for a field present in the document.
    TagMissing,
}

/// Outcome for one field, or for the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReport {
    /// Field path, or [`AGGREGATE_LABEL`] for the aggregate entry.
    pub path: String,

    /// Tag held by the store before the run.
    pub stored_tag: Option<String>,

    /// Freshly computed tag; absent when the field is not in the document.
    pub computed_tag: Option<String>,

    /// Stored and computed tags are equal.
    #[serde(rename = "match")]
    pub matches: bool,

    /// Non-fatal finding, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<FieldIssue>,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Mode the run executed in.
    pub mode: ReconcileMode,

    /// Backend the tags were read from.
    pub backend: StoreBackend,

    /// One entry per processed path, in processing order.
    pub fields: Vec<FieldReport>,

    /// Aggregate tag comparison.
    pub aggregate: FieldReport,

    /// Tags were written back to the store.
    pub applied: bool,
}

impl ReconcileReport {
    /// Every present field and the aggregate matched their stored tags.
    ///
    /// Fields absent from the document are not counted against the result.
    pub fn all_match(&self) -> bool {
        self.aggregate.matches
            && self
                .fields
                .iter()
                .filter(|f| f.issue != Some(FieldIssue::FieldNotFound))
                .all(|f| f.matches)
    }

    /// Fields present in the document whose tag did not match.
    pub fn mismatches(&self) -> impl Iterator<Item = &FieldReport> {
        self.fields
            .iter()
            .filter(|f| f.computed_tag.is_some() && !f.matches)
    }

    /// Paths that did not resolve in the document.
    pub fn missing_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.issue == Some(FieldIssue::FieldNotFound))
            .map(|f| f.path.as_str())
    }

    /// Tag set built from the computed tags of present fields.
    pub fn computed_tags(&self) -> TagSet {
        self.fields
            .iter()
            .filter_map(|f| f.computed_tag.as_ref().map(|t| (f.path.clone(), t.clone())))
            .collect()
    }
}

/// Per-run parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Verify or apply.
    pub mode: ReconcileMode,

    /// Seed key encoding.
    pub seed_encoding: SeedEncoding,

    /// Tag set layout for the aggregate.
    pub aggregate_layout: AggregateLayout,

    /// Protected paths to process.
    pub paths: Vec<String>,

    /// Also process every path the store already holds a tag for.
    pub include_stored_paths: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            mode: ReconcileMode::VerifyOnly,
            seed_encoding: SeedEncoding::default(),
            aggregate_layout: AggregateLayout::default(),
            paths: DEFAULT_PROTECTED_PATHS.iter().map(|p| p.to_string()).collect(),
            include_stored_paths: false,
        }
    }
}

impl ReconcileOptions {
    /// Same options in another mode.
    pub fn with_mode(mut self, mode: ReconcileMode) -> Self {
        self.mode = mode;
        self
    }

    /// Same options over another path list.
    pub fn with_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }
}

/// Three-way comparison of a stored tag against a computed one.
///
/// `Ok(true)` on match, `Ok(false)` on mismatch, `Err(TagMissing)` when
/// nothing is stored.
pub fn verify_tag(path: &str, stored: Option<&str>, computed: &str) -> Result<bool> {
    match stored {
        Some(stored) => Ok(tags_match(stored, computed)),
        None => Err(PrefMacError::TagMissing(path.to_string())),
    }
}

/// Drives one reconciliation pass.
///
/// # Example
///
/// ```rust
/// use prefmac_core::identity::FixedIdentitySource;
/// use prefmac_core::reconcile::{ReconcileMode, ReconcileOptions, Reconciler};
/// use prefmac_core::seed::Seed;
/// use prefmac_core::store::DocumentTagStore;
/// use serde_json::json;
///
/// let source = FixedIdentitySource::new("S-1-5-21-1-2-3", 1234);
/// let options = ReconcileOptions::default()
///     .with_mode(ReconcileMode::Apply)
///     .with_paths(["homepage"]);
/// let mut reconciler = Reconciler::with_seed(&source, Seed::from_bytes([0u8; 64]), options);
///
/// let prefs = json!({"homepage": "https://example.com/"});
/// let mut store = DocumentTagStore::new(prefs.clone()).unwrap();
/// let report = reconciler.run(&prefs, &mut store).unwrap();
/// assert!(report.applied);
/// ```
pub struct Reconciler<'a> {
    identity_source: &'a dyn PlatformIdentitySource,
    seed_source: SeedSource,
    options: ReconcileOptions,
    state: ReconcileState,
}

enum SeedSource {
    File(PathBuf),
    Loaded(Seed),
}

/// Everything computed before any write is attempted.
struct Computed {
    fields: Vec<FieldReport>,
    tags: TagSet,
}

impl<'a> Reconciler<'a> {
    /// Reconciler that reads the seed from `seed_path` when run.
    pub fn new(
        identity_source: &'a dyn PlatformIdentitySource,
        seed_path: impl Into<PathBuf>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            identity_source,
            seed_source: SeedSource::File(seed_path.into()),
            options,
            state: ReconcileState::Init,
        }
    }

    /// Reconciler over an already extracted seed.
    pub fn with_seed(
        identity_source: &'a dyn PlatformIdentitySource,
        seed: Seed,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            identity_source,
            seed_source: SeedSource::Loaded(seed),
            options,
            state: ReconcileState::Init,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Options this reconciler runs with.
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Runs one pass over `document` against `store`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; the reconciler is then `Failed` and
    /// the store has not been written.
    pub fn run(&mut self, document: &Value, store: &mut dyn TagStore) -> Result<ReconcileReport> {
        self.state = ReconcileState::Init;

        match self.run_pass(document, store) {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(state = ?self.state, error = %e, "reconciliation failed");
                self.transition(ReconcileState::Failed);
                Err(e)
            }
        }
    }

    fn run_pass(&mut self, document: &Value, store: &mut dyn TagStore) -> Result<ReconcileReport> {
        let computer = self.prepare()?;
        self.transition(ReconcileState::IdentityReady);

        let paths = self.field_paths(store)?;
        let computed = self.process_fields(&computer, document, &paths, store)?;
        self.transition(ReconcileState::FieldsProcessed);

        let aggregate_tag = computer.aggregate_tag(&computed.tags)?;
        let stored_aggregate = store.read_aggregate()?;
        let aggregate = self.compare(AGGREGATE_LABEL, stored_aggregate, aggregate_tag.clone());
        self.transition(ReconcileState::AggregateReady);

        let applied = match self.options.mode {
            ReconcileMode::Apply => {
                commit(store, &computed.tags, &aggregate_tag)?;
                true
            }
            ReconcileMode::VerifyOnly => false,
        };
        self.transition(ReconcileState::Done);

        let report = ReconcileReport {
            mode: self.options.mode,
            backend: store.backend(),
            fields: computed.fields,
            aggregate,
            applied,
        };
        info!(
            mode = ?report.mode,
            fields = report.fields.len(),
            all_match = report.all_match(),
            applied,
            "reconciliation complete"
        );
        Ok(report)
    }

    fn prepare(&self) -> Result<TagComputer> {
        let identity = MachineIdentity::derive(self.identity_source)?;
        let seed = match &self.seed_source {
            SeedSource::File(path) => Seed::extract(path)?,
            SeedSource::Loaded(seed) => seed.clone(),
        };
        Ok(TagComputer::new(
            identity,
            &seed,
            self.options.seed_encoding,
            self.options.aggregate_layout,
        ))
    }

    /// Configured paths first, then stored-only paths when requested.
    fn field_paths(&self, store: &dyn TagStore) -> Result<Vec<FieldPath>> {
        let mut seen = BTreeSet::new();
        let mut paths = Vec::new();

        for raw in &self.options.paths {
            if seen.insert(raw.clone()) {
                paths.push(FieldPath::parse(raw)?);
            }
        }
        if self.options.include_stored_paths {
            for raw in store.stored_paths()? {
                if seen.insert(raw.clone()) {
                    paths.push(FieldPath::parse(&raw)?);
                }
            }
        }
        Ok(paths)
    }

    fn process_fields(
        &self,
        computer: &TagComputer,
        document: &Value,
        paths: &[FieldPath],
        store: &dyn TagStore,
    ) -> Result<Computed> {
        let mut fields = Vec::with_capacity(paths.len());
        let mut tags = TagSet::new();

        for path in paths {
            let stored = store.read(path.as_str())?;

            let field = match canonicalize_path(document, path) {
                Ok(field) => field,
                Err(PrefMacError::FieldNotFound(_)) => {
                    debug!(path = %path, "protected field not in document");
                    fields.push(FieldReport {
                        path: path.as_str().to_string(),
                        stored_tag: stored,
                        computed_tag: None,
                        matches: false,
                        issue: Some(FieldIssue::FieldNotFound),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            let ProtectedField {
                path: signed_path,
                tag: Some(computed),
                ..
            } = computer.sign(field)?
            else {
                continue;
            };
            tags.insert(signed_path.clone(), computed.clone());
            fields.push(self.compare(&signed_path, stored, computed));
        }

        Ok(Computed { fields, tags })
    }

    fn compare(&self, path: &str, stored: Option<String>, computed: String) -> FieldReport {
        let (matches, issue) = match verify_tag(path, stored.as_deref(), &computed) {
            Ok(matches) => (matches, None),
            Err(_) if self.options.mode == ReconcileMode::VerifyOnly => {
                (false, Some(FieldIssue::TagMissing))
            }
            Err(_) => (false, None),
        };

        if matches {
            debug!(path, "tag matches");
        } else if self.options.mode == ReconcileMode::VerifyOnly {
            warn!(path, stored = ?stored, computed = %computed, "tag mismatch");
        } else {
            debug!(path, stored = ?stored, computed = %computed, "tag will be rewritten");
        }

        FieldReport {
            path: path.to_string(),
            stored_tag: stored,
            computed_tag: Some(computed),
            matches,
            issue,
        }
    }

    fn transition(&mut self, next: ReconcileState) {
        debug!(from = ?self.state, to = ?next, "reconciler transition");
        self.state = next;
    }
}

/// Writes every computed tag, then the aggregate, then flushes.
fn commit(store: &mut dyn TagStore, tags: &TagSet, aggregate: &str) -> Result<()> {
    store.write_tags(tags, aggregate)?;
    store.flush()?;
    info!(fields = tags.len(), "committed tags");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FixedIdentitySource;
    use crate::models::SEED_LEN;
    use crate::store::{DocumentTagStore, SecureTagStore};
    use serde_json::json;

    fn source() -> FixedIdentitySource {
        FixedIdentitySource::new("S-1-5-21-1650828501-840997873-2917006960", 1551496638)
    }

    fn options(mode: ReconcileMode) -> ReconcileOptions {
        ReconcileOptions::default().with_mode(mode).with_paths([
            "homepage",
            "session.restore_on_startup",
            "session.startup_urls",
        ])
    }

    fn prefs() -> Value {
        json!({
            "homepage": "https://example.com/<home>",
            "session": {"restore_on_startup": 4, "startup_urls": ["https://example.com/"]}
        })
    }

    fn seed() -> Seed {
        Seed::from_bytes([0x5Au8; SEED_LEN])
    }

    fn signed_store(document: &Value) -> DocumentTagStore {
        let source = source();
        let mut store = DocumentTagStore::new(json!({})).unwrap();
        Reconciler::with_seed(&source, seed(), options(ReconcileMode::Apply))
            .run(document, &mut store)
            .unwrap();
        store
    }

    #[test]
    fn test_apply_then_verify_all_match() {
        let store_doc = signed_store(&prefs()).into_document();
        let mut store = DocumentTagStore::new(store_doc).unwrap();

        let source = source();
        let mut reconciler =
            Reconciler::with_seed(&source, seed(), options(ReconcileMode::VerifyOnly));
        let report = reconciler.run(&prefs(), &mut store).unwrap();

        assert_eq!(reconciler.state(), ReconcileState::Done);
        assert!(report.all_match());
        assert!(!report.applied);
        assert_eq!(report.fields.len(), 3);
        assert!(report.fields.iter().all(|f| f.matches && f.issue.is_none()));
    }

    #[test]
    fn test_verify_detects_edited_field() {
        let mut store = signed_store(&prefs());
        let mut edited = prefs();
        edited["homepage"] = json!("https://evil.example/");

        let source = source();
        let report = Reconciler::with_seed(&source, seed(), options(ReconcileMode::VerifyOnly))
            .run(&edited, &mut store)
            .unwrap();

        let mismatched: Vec<&str> = report.mismatches().map(|f| f.path.as_str()).collect();
        assert_eq!(mismatched, vec!["homepage"]);
        assert!(!report.aggregate.matches);
        assert!(!report.all_match());
    }

    #[test]
    fn test_verify_tampered_aggregate_leaves_store_untouched() {
        let mut store = signed_store(&prefs());
        store.write_aggregate(&"0".repeat(64)).unwrap();
        let before = store.document().clone();

        let source = source();
        let report = Reconciler::with_seed(&source, seed(), options(ReconcileMode::VerifyOnly))
            .run(&prefs(), &mut store)
            .unwrap();

        assert!(!report.aggregate.matches);
        assert!(report.fields.iter().all(|f| f.matches));
        assert_eq!(store.document(), &before);
    }

    #[test]
    fn test_missing_field_is_isolated() {
        let source = source();
        let opts = options(ReconcileMode::Apply).with_paths([
            "homepage",
            "missing.field",
            "session.restore_on_startup",
        ]);
        let mut store = DocumentTagStore::new(json!({})).unwrap();
        let report = Reconciler::with_seed(&source, seed(), opts)
            .run(&prefs(), &mut store)
            .unwrap();

        assert_eq!(report.missing_fields().collect::<Vec<_>>(), vec!["missing.field"]);
        assert_eq!(report.fields.len(), 3);
        assert!(report.fields[0].computed_tag.is_some());
        assert!(report.fields[2].computed_tag.is_some());
        assert_eq!(report.computed_tags().len(), 2);
        assert_eq!(store.stored_paths().unwrap(), vec!["homepage", "session.restore_on_startup"]);
    }

    #[test]
    fn test_verify_reports_tag_missing() {
        let source = source();
        let mut store = DocumentTagStore::new(json!({})).unwrap();
        let report = Reconciler::with_seed(&source, seed(), options(ReconcileMode::VerifyOnly))
            .run(&prefs(), &mut store)
            .unwrap();

        assert!(report
            .fields
            .iter()
            .all(|f| f.issue == Some(FieldIssue::TagMissing) && !f.matches));
        assert_eq!(report.aggregate.issue, Some(FieldIssue::TagMissing));
        assert_eq!(store.document(), &json!({}));
    }

    #[test]
    fn test_apply_reports_previous_state() {
        let source = source();
        let mut store = DocumentTagStore::new(json!({})).unwrap();
        let report = Reconciler::with_seed(&source, seed(), options(ReconcileMode::Apply))
            .run(&prefs(), &mut store)
            .unwrap();

        assert!(report.applied);
        assert!(report.fields.iter().all(|f| !f.matches && f.issue.is_none()));
        assert_eq!(
            store.read_aggregate().unwrap(),
            report.aggregate.computed_tag
        );
    }

    #[test]
    fn test_aggregate_covers_only_processed_fields() {
        let source = source();
        let mut store = DocumentTagStore::new(json!({})).unwrap();
        let report = Reconciler::with_seed(&source, seed(), options(ReconcileMode::Apply))
            .run(&prefs(), &mut store)
            .unwrap();

        let identity = MachineIdentity::derive(&source).unwrap();
        let computer = TagComputer::new(
            identity,
            &seed(),
            SeedEncoding::default(),
            AggregateLayout::default(),
        );
        let expected = computer.aggregate_tag(&report.computed_tags()).unwrap();
        assert_eq!(report.aggregate.computed_tag.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_include_stored_paths() {
        let mut store = signed_store(&prefs());
        let source = source();
        let opts = ReconcileOptions {
            paths: Vec::new(),
            include_stored_paths: true,
            ..options(ReconcileMode::VerifyOnly)
        };

        let report = Reconciler::with_seed(&source, seed(), opts)
            .run(&prefs(), &mut store)
            .unwrap();
        assert_eq!(report.fields.len(), 3);
        assert!(report.all_match());
    }

    #[test]
    fn test_stored_dotted_key_is_reconciled() {
        let mut store = DocumentTagStore::new(json!({
            "protection": {"macs": {"extensions": {"settings": {"abc.def": "00"}}}}
        }))
        .unwrap();
        let document = json!({"extensions": {"settings": {"abc.def": {"state": 1}}}});
        let source = source();
        let opts = ReconcileOptions {
            paths: Vec::new(),
            include_stored_paths: true,
            ..options(ReconcileMode::VerifyOnly)
        };

        let report = Reconciler::with_seed(&source, seed(), opts)
            .run(&document, &mut store)
            .unwrap();
        assert_eq!(report.fields.len(), 1);
        assert_eq!(report.fields[0].path, "extensions.settings['abc.def']");
        assert!(report.fields[0].computed_tag.is_some());
        assert_eq!(report.fields[0].stored_tag.as_deref(), Some("00"));
        assert!(report.missing_fields().next().is_none());
    }

    #[test]
    fn test_seed_missing_fails_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let mut store = DocumentTagStore::new(json!({})).unwrap();
        let mut reconciler = Reconciler::new(
            &source,
            dir.path().join("resources.pak"),
            options(ReconcileMode::Apply),
        );

        let err = reconciler.run(&prefs(), &mut store).unwrap_err();
        assert!(matches!(err, PrefMacError::SeedSourceMissing { .. }));
        assert_eq!(reconciler.state(), ReconcileState::Failed);
        assert_eq!(store.document(), &json!({}));
    }

    #[test]
    fn test_identity_failure_is_fatal() {
        struct NoIdentity;
        impl PlatformIdentitySource for NoIdentity {
            fn security_identifier(&self) -> Result<String> {
                Err(PrefMacError::IdentityUnavailable("offline".to_string()))
            }
            fn volume_serial(&self) -> Result<u32> {
                Err(PrefMacError::IdentityUnavailable("offline".to_string()))
            }
        }

        let mut store = DocumentTagStore::new(json!({})).unwrap();
        let mut reconciler =
            Reconciler::with_seed(&NoIdentity, seed(), options(ReconcileMode::Apply));
        let err = reconciler.run(&prefs(), &mut store).unwrap_err();

        assert!(matches!(err, PrefMacError::IdentityUnavailable(_)));
        assert!(reconciler.state().is_terminal());
        assert_eq!(store.document(), &json!({}));
    }

    #[test]
    fn test_secure_store_backend() {
        let source = source();
        let mut store = SecureTagStore::temporary("PreferenceMACs", "Default").unwrap();

        let applied = Reconciler::with_seed(&source, seed(), options(ReconcileMode::Apply))
            .run(&prefs(), &mut store)
            .unwrap();
        assert_eq!(applied.backend, StoreBackend::SecureStore);
        assert_eq!(store.len(), 3);

        let verified = Reconciler::with_seed(&source, seed(), options(ReconcileMode::VerifyOnly))
            .run(&prefs(), &mut store)
            .unwrap();
        assert!(verified.all_match());
    }

    #[test]
    fn test_report_json_shape() {
        let source = source();
        let mut store = DocumentTagStore::new(json!({})).unwrap();
        let report = Reconciler::with_seed(&source, seed(), options(ReconcileMode::VerifyOnly))
            .run(&prefs(), &mut store)
            .unwrap();

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["mode"], "verify_only");
        assert_eq!(value["aggregate"]["path"], AGGREGATE_LABEL);
        assert_eq!(value["fields"][0]["match"], false);
        assert_eq!(value["fields"][0]["issue"], "tag_missing");
        assert!(value["fields"][0]["stored_tag"].is_null());
    }

    #[test]
    fn test_verify_tag_tri_state() {
        let tag = "AB".repeat(32);
        assert!(verify_tag("p", Some(&tag), &tag).unwrap());
        assert!(!verify_tag("p", Some("00"), &tag).unwrap());
        assert!(matches!(
            verify_tag("p", None, &tag),
            Err(PrefMacError::TagMissing(p)) if p == "p"
        ));
    }
}
