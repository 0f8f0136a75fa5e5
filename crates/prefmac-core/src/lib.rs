//! # prefmac - Preference Integrity Tags
//!
//! Browser preference files carry HMAC-SHA256 tags over their protected
//! settings. A tag binds a setting's value to its key path and to the
//! machine it was written on; a second, aggregate tag covers the set of all
//! field tags. A preference edited outside the browser no longer matches its
//! tag and is reset on the next start.
//!
//! This crate recomputes those tags, verifies stored ones, and re-signs a
//! document after a deliberate external edit.
//!
//! ## Threat Model
//!
//! | Threat | Description | Defense |
//! |--------|-------------|---------|
//! | Value tampering | A protected value is edited on disk | Field tag mismatch |
//! | Tag transplant | A tag is copied onto another path | Path is part of the MAC message |
//! | Profile copy | Preferences copied to another machine | Machine identity is part of the MAC message |
//! | Tag deletion | A field tag is dropped to hide an edit | Aggregate tag mismatch |
//! | Timing probes | Comparing tags byte by byte | Constant-time comparison |
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                            RECONCILER                             │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                                                                   │
//! │  ┌──────────────────┐   ┌──────────────┐   ┌──────────────────┐   │
//! │  │ MACHINE IDENTITY │   │     SEED     │   │  CANONICALIZER   │   │
//! │  │                  │   │              │   │                  │   │
//! │  │ SHA-1(SID) +     │   │ first 64     │   │ compact JSON,    │   │
//! │  │ volume serial +  │   │ bytes of the │   │ `<` escaped      │   │
//! │  │ XOR checksum     │   │ seed file    │   │                  │   │
//! │  └────────┬─────────┘   └──────┬───────┘   └────────┬─────────┘   │
//! │           │                    │                    │             │
//! │           └──────────────┬─────┴────────────────────┘             │
//! │                          ▼                                        │
//! │               ┌─────────────────────┐                             │
//! │               │    TAG COMPUTER     │                             │
//! │               │  HMAC-SHA256 field  │                             │
//! │               │  + aggregate tags   │                             │
//! │               └──────────┬──────────┘                             │
//! │                          ▼                                        │
//! │  ┌───────────────────────────────────────────────────────────┐    │
//! │  │                        TAG STORE                          │    │
//! │  │  Document: protection.macs / protection.super_mac         │    │
//! │  │  Secure:   PreferenceMACs\<profile> / PreferenceMACs      │    │
//! │  └───────────────────────────────────────────────────────────┘    │
//! │                                                                   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## How It Works
//!
//! ### Field tag
//!
//! 1. Derive the machine identity from the account SID and volume serial
//! 2. Serialize the value at the field's key path compactly, escaping `<`
//! 3. HMAC-SHA256 over `identity + path + value` keyed by the seed
//! 4. Render as 64 uppercase hex characters
//!
//! ### Aggregate tag
//!
//! 1. Collect the field tags into a tag set keyed by path
//! 2. Serialize the tag set (nested or flat layout, keys sorted)
//! 3. HMAC-SHA256 over `identity + tag set` with the same key
//!
//! ## References
//!
//! - **RFC 2104 (1997)** - "HMAC: Keyed-Hashing for Message Authentication"
//!   <https://www.rfc-editor.org/rfc/rfc2104>
//!
//! - **NIST FIPS 180-4** - "Secure Hash Standard (SHS)" - SHA-1 and SHA-256.
//!   <https://csrc.nist.gov/publications/detail/fips/180/4/final>
//!
//! - **Sled Documentation** - Embedded database for the secure tag store.
//!   <https://sled.rs/>
//!
//! ## Usage
//!
//! ```rust
//! use prefmac_core::identity::FixedIdentitySource;
//! use prefmac_core::reconcile::{ReconcileMode, ReconcileOptions, Reconciler};
//! use prefmac_core::seed::Seed;
//! use prefmac_core::store::DocumentTagStore;
//! use serde_json::json;
//!
//! let source = FixedIdentitySource::new("S-1-5-21-1650828501-840997873-2917006960", 1551496638);
//! let seed = Seed::from_bytes([0u8; 64]);
//! let prefs = json!({
//!     "homepage": "https://example.com/",
//!     "session": {"restore_on_startup": 4}
//! });
//!
//! // Sign
//! let apply = ReconcileOptions::default()
//!     .with_mode(ReconcileMode::Apply)
//!     .with_paths(["homepage", "session.restore_on_startup"]);
//! let mut store = DocumentTagStore::new(prefs.clone()).unwrap();
//! Reconciler::with_seed(&source, seed.clone(), apply.clone())
//!     .run(&prefs, &mut store)
//!     .unwrap();
//!
//! // Verify
//! let verify = apply.with_mode(ReconcileMode::VerifyOnly);
//! let report = Reconciler::with_seed(&source, seed, verify)
//!     .run(&prefs, &mut store)
//!     .unwrap();
//! assert!(report.all_match());
//! ```
//!
//! ## Security Considerations
//!
//! - **Seed handling**: The seed never appears in logs or `Debug` output.
//!
//! - **Write ordering**: No tag is written until every field tag and the
//!   aggregate have been computed. A failed run leaves the store unchanged.
//!
//! - **Concurrency**: Stores do not lock. [`profile::ProfileSigner`] holds
//!   an exclusive file lock on each document for the whole run.

pub mod canonicalize;
pub mod config;
pub mod document;
pub mod identity;
pub mod models;
pub mod path;
pub mod profile;
pub mod reconcile;
pub mod seed;
pub mod startup;
pub mod store;
pub mod tag;

pub use config::PrefMacConfig;
pub use identity::{MachineIdentity, PlatformIdentitySource};
pub use models::{AggregateLayout, PrefMacError, ProtectedField, Result, TagSet};
pub use profile::{ProfileFiles, ProfileSigner};
pub use reconcile::{ReconcileMode, ReconcileReport, Reconciler};
pub use seed::{Seed, SeedEncoding};
pub use store::{StoreBackend, TagStore};
pub use tag::TagComputer;
