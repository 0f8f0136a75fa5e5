//! # Tag Computation
//!
//! Per-field and aggregate tags are HMAC-SHA256 over plain concatenations,
//! rendered as uppercase hex:
//!
//! ```text
//! field tag     = HMAC(key, identity || path || canonical_content)
//! aggregate tag = HMAC(key, identity || ""   || canonical(tag_set))
//! ```
//!
//! No separators are inserted. The empty path in the aggregate message is
//! part of the format and must stay. `key` is the seed in the configured
//! [`SeedEncoding`].
//!
//! ## References
//!
//! - **RFC 2104** - "HMAC: Keyed-Hashing for Message Authentication"
//!   <https://www.rfc-editor.org/rfc/rfc2104>
//! - **NIST FIPS 180-4** - SHA-256.

use crate::canonicalize::canonical_tag_set;
use crate::identity::MachineIdentity;
use crate::models::{AggregateLayout, PrefMacError, ProtectedField, Result, TagSet};
use crate::seed::{Seed, SeedEncoding};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes the tag of one protected field.
///
/// # Example
///
/// ```rust
/// use prefmac_core::identity::MachineIdentity;
/// use prefmac_core::tag::compute_field_tag;
///
/// let identity = MachineIdentity::from_raw("ABC123");
/// let tag = compute_field_tag(&identity, "homepage", r#""http://example.com""#, &[0u8; 64])
///     .unwrap();
/// assert_eq!(tag.len(), 64);
/// ```
///
/// # Errors
///
/// Returns `PrefMacError::KeyDerivationFailed` if the MAC cannot be keyed.
pub fn compute_field_tag(
    identity: &MachineIdentity,
    path: &str,
    canonical_content: &str,
    key: &[u8],
) -> Result<String> {
    mac_hex(key, &[identity.as_str(), path, canonical_content])
}

/// Computes the aggregate tag over a full tag set.
///
/// # Errors
///
/// - `PrefMacError::KeyDerivationFailed` if the MAC cannot be keyed.
/// - `PrefMacError::InvalidPath` if the tag set cannot be laid out.
pub fn compute_aggregate_tag(
    identity: &MachineIdentity,
    tags: &TagSet,
    key: &[u8],
    layout: AggregateLayout,
) -> Result<String> {
    let canonical = canonical_tag_set(tags, layout)?;
    mac_hex(key, &[identity.as_str(), "", &canonical])
}

/// Compares a stored tag against a computed one in constant time.
///
/// Hex case is ignored; any other difference, including length, is a
/// mismatch.
pub fn tags_match(stored: &str, computed: &str) -> bool {
    let stored = stored.to_ascii_uppercase();
    let computed = computed.to_ascii_uppercase();
    stored.len() == computed.len() && bool::from(stored.as_bytes().ct_eq(computed.as_bytes()))
}

fn mac_hex(key: &[u8], parts: &[&str]) -> Result<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| PrefMacError::KeyDerivationFailed(e.to_string()))?;
    for part in parts {
        mac.update(part.as_bytes());
    }
    Ok(hex::encode_upper(mac.finalize().into_bytes()))
}

/// Identity and key bound together for one run.
///
/// The key is derived from the seed once; the computer is then reused for
/// every field and for the aggregate.
pub struct TagComputer {
    identity: MachineIdentity,
    key: Vec<u8>,
    layout: AggregateLayout,
}

impl TagComputer {
    /// Binds `identity` to the seed in the selected encoding.
    pub fn new(
        identity: MachineIdentity,
        seed: &Seed,
        encoding: SeedEncoding,
        layout: AggregateLayout,
    ) -> Self {
        Self {
            identity,
            key: seed.key_bytes(encoding),
            layout,
        }
    }

    /// The identity every tag is bound to.
    pub fn identity(&self) -> &MachineIdentity {
        &self.identity
    }

    /// Tag for a canonicalized field.
    pub fn field_tag(&self, field: &ProtectedField) -> Result<String> {
        compute_field_tag(
            &self.identity,
            &field.path,
            &field.canonical_content,
            &self.key,
        )
    }

    /// Fills in the tag of a canonicalized field.
    pub fn sign(&self, mut field: ProtectedField) -> Result<ProtectedField> {
        field.tag = Some(self.field_tag(&field)?);
        Ok(field)
    }

    /// Aggregate tag for `tags`.
    pub fn aggregate_tag(&self, tags: &TagSet) -> Result<String> {
        compute_aggregate_tag(&self.identity, tags, &self.key, self.layout)
    }
}

impl std::fmt::Debug for TagComputer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagComputer")
            .field("identity", &self.identity)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
