//! # Machine Identity Derivation
//!
//! Every tag binds its field to one machine: the MAC message starts with a
//! machine identity string derived from two platform signals.
//!
//! ```text
//! identity = SHA1_HEX(sid) || volume_serial_decimal || checksum
//!
//!   SHA1_HEX        40 uppercase hex digits of SHA-1 over the SID text
//!   volume_serial   root volume serial number, decimal, no leading zeros
//!   checksum        XOR of every UTF-8 byte of the two parts above,
//!                   rendered as two uppercase hex digits
//! ```
//!
//! The identity is only ever used as MAC input, so it must match the
//! browser's own derivation byte for byte (case included).
//!
//! Platform signals are obtained through [`PlatformIdentitySource`] so tests
//! and offline runs can substitute fixed values for live queries.

use crate::models::{PrefMacError, Result};
use sha1::{Digest, Sha1};
use std::fmt;
use tracing::debug;

/// Capability that answers the two platform identity queries.
pub trait PlatformIdentitySource {
    /// Security identifier string of the local account, e.g.
    /// `S-1-5-21-1650828501-840997873-2917006960`.
    fn security_identifier(&self) -> Result<String>;

    /// Serial number of the root volume.
    fn volume_serial(&self) -> Result<u32>;
}

/// Identity source answering from configured values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedIdentitySource {
    sid: String,
    volume_serial: u32,
}

impl FixedIdentitySource {
    /// Creates a source that always reports `sid` and `volume_serial`.
    pub fn new(sid: impl Into<String>, volume_serial: u32) -> Self {
        Self {
            sid: sid.into(),
            volume_serial,
        }
    }
}

impl PlatformIdentitySource for FixedIdentitySource {
    fn security_identifier(&self) -> Result<String> {
        Ok(self.sid.clone())
    }

    fn volume_serial(&self) -> Result<u32> {
        Ok(self.volume_serial)
    }
}

/// Identity source backed by live platform queries.
///
/// The SID is looked up for `account_name` (the machine name when unset) and
/// the serial for the volume mounted at `volume_root`. Both queries are only
/// available on Windows; elsewhere they fail with `IdentityUnavailable`.
#[derive(Debug, Clone)]
pub struct SystemIdentitySource {
    account_name: Option<String>,
    volume_root: String,
}

impl SystemIdentitySource {
    /// Creates a source for the given account and volume root (e.g. `C:\`).
    pub fn new(account_name: Option<String>, volume_root: impl Into<String>) -> Self {
        Self {
            account_name,
            volume_root: volume_root.into(),
        }
    }

    fn account(&self) -> Result<String> {
        match &self.account_name {
            Some(name) => Ok(name.clone()),
            None => std::env::var("COMPUTERNAME").map_err(|_| {
                PrefMacError::IdentityUnavailable("machine name is not set".to_string())
            }),
        }
    }
}

impl Default for SystemIdentitySource {
    fn default() -> Self {
        Self::new(None, r"C:\")
    }
}

impl PlatformIdentitySource for SystemIdentitySource {
    fn security_identifier(&self) -> Result<String> {
        let account = self.account()?;
        sys::account_sid(&account).map_err(PrefMacError::IdentityUnavailable)
    }

    fn volume_serial(&self) -> Result<u32> {
        sys::volume_serial(&self.volume_root).map_err(PrefMacError::IdentityUnavailable)
    }
}

/// Derived machine identity. Immutable once computed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MachineIdentity(String);

impl MachineIdentity {
    /// Queries `source` and derives the identity.
    ///
    /// # Errors
    ///
    /// Propagates `PrefMacError::IdentityUnavailable` from either query.
    pub fn derive(source: &dyn PlatformIdentitySource) -> Result<Self> {
        let sid = source.security_identifier()?;
        let serial = source.volume_serial()?;
        let identity = Self::from_parts(&sid, serial);
        debug!(identity = %identity, "derived machine identity");
        Ok(identity)
    }

    /// Derives the identity from already known signals.
    pub fn from_parts(sid: &str, volume_serial: u32) -> Self {
        let mut id = hex::encode_upper(Sha1::digest(sid.as_bytes()));
        id.push_str(&volume_serial.to_string());
        let checksum = xor_checksum(id.as_bytes());
        id.push_str(&format!("{checksum:02X}"));
        MachineIdentity(id)
    }

    /// Wraps an identity string obtained elsewhere.
    pub fn from_raw(identity: impl Into<String>) -> Self {
        MachineIdentity(identity.into())
    }

    /// The identity text used as MAC input.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for MachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MachineIdentity").field(&self.0).finish()
    }
}

/// XOR fold of `bytes`, no carry.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

#[cfg(windows)]
mod sys {
    use std::ptr;
    use windows_sys::Win32::Foundation::{GetLastError, LocalFree};
    use windows_sys::Win32::Security::Authorization::ConvertSidToStringSidW;
    use windows_sys::Win32::Security::{LookupAccountNameW, SID_NAME_USE};
    use windows_sys::Win32::Storage::FileSystem::GetVolumeInformationW;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    pub(super) fn account_sid(account: &str) -> Result<String, String> {
        let name = wide(account);
        let mut sid_len = 0u32;
        let mut domain_len = 0u32;
        let mut sid_use: SID_NAME_USE = 0;

        // First call only reports the buffer sizes.
        unsafe {
            LookupAccountNameW(
                ptr::null(),
                name.as_ptr(),
                ptr::null_mut(),
                &mut sid_len,
                ptr::null_mut(),
                &mut domain_len,
                &mut sid_use,
            );
        }
        if sid_len == 0 {
            return Err(format!(
                "LookupAccountNameW({account}) failed: error {}",
                unsafe { GetLastError() }
            ));
        }

        let mut sid = vec![0u8; sid_len as usize];
        let mut domain = vec![0u16; domain_len.max(1) as usize];
        let ok = unsafe {
            LookupAccountNameW(
                ptr::null(),
                name.as_ptr(),
                sid.as_mut_ptr().cast(),
                &mut sid_len,
                domain.as_mut_ptr(),
                &mut domain_len,
                &mut sid_use,
            )
        };
        if ok == 0 {
            return Err(format!(
                "LookupAccountNameW({account}) failed: error {}",
                unsafe { GetLastError() }
            ));
        }

        let mut text: *mut u16 = ptr::null_mut();
        if unsafe { ConvertSidToStringSidW(sid.as_mut_ptr().cast(), &mut text) } == 0 {
            return Err(format!("ConvertSidToStringSidW failed: error {}", unsafe {
                GetLastError()
            }));
        }

        let sid_text = unsafe {
            let len = (0..).take_while(|&i| *text.add(i) != 0).count();
            let value = String::from_utf16_lossy(std::slice::from_raw_parts(text, len));
            LocalFree(text.cast());
            value
        };
        Ok(sid_text)
    }

    pub(super) fn volume_serial(root: &str) -> Result<u32, String> {
        let root_w = wide(root);
        let mut serial = 0u32;
        let mut max_component = 0u32;
        let mut flags = 0u32;

        let ok = unsafe {
            GetVolumeInformationW(
                root_w.as_ptr(),
                ptr::null_mut(),
                0,
                &mut serial,
                &mut max_component,
                &mut flags,
                ptr::null_mut(),
                0,
            )
        };
        if ok == 0 {
            return Err(format!("GetVolumeInformationW({root}) failed: error {}", unsafe {
                GetLastError()
            }));
        }
        Ok(serial)
    }
}

#[cfg(not(windows))]
mod sys {
    pub(super) fn account_sid(account: &str) -> Result<String, String> {
        Err(format!(
            "security identifier lookup for '{account}' is only supported on Windows"
        ))
    }

    pub(super) fn volume_serial(root: &str) -> Result<u32, String> {
        Err(format!(
            "volume serial lookup for '{root}' is only supported on Windows"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SID: &str = "S-1-5-21-1650828501-840997873-2917006960";
    const SERIAL: u32 = 1551496638;
    const EXPECTED: &str = "4D9B281C28105D1BA9012FA0F6AD3FCD5A52696B15514966380F";

    struct FailingSource;

    impl PlatformIdentitySource for FailingSource {
        fn security_identifier(&self) -> Result<String> {
            Err(PrefMacError::IdentityUnavailable("no SID".to_string()))
        }

        fn volume_serial(&self) -> Result<u32> {
            Ok(1)
        }
    }

    #[test]
    fn test_golden_identity() {
        let source = FixedIdentitySource::new(SID, SERIAL);
        let identity = MachineIdentity::derive(&source).unwrap();
        assert_eq!(identity.as_str(), EXPECTED);
    }

    #[test]
    fn test_derive_is_deterministic() {
        let source = FixedIdentitySource::new(SID, SERIAL);
        let first = MachineIdentity::derive(&source).unwrap();
        let second = MachineIdentity::derive(&source).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_identity_layout() {
        let identity = MachineIdentity::from_parts(SID, SERIAL);
        let text = identity.as_str();

        let (sha, rest) = text.split_at(40);
        assert!(sha.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));

        let (serial, checksum) = rest.split_at(rest.len() - 2);
        assert_eq!(serial, "1551496638");

        let expected = xor_checksum(text[..text.len() - 2].as_bytes());
        assert_eq!(checksum, format!("{expected:02X}"));
    }

    #[test]
    fn test_serial_has_no_leading_zeros() {
        let identity = MachineIdentity::from_parts(SID, 42);
        assert_eq!(&identity.as_str()[40..42], "42");
        assert_eq!(identity.as_str().len(), 40 + 2 + 2);
    }

    #[test]
    fn test_xor_checksum() {
        assert_eq!(xor_checksum(b""), 0);
        assert_eq!(xor_checksum(&[0x0F]), 0x0F);
        assert_eq!(xor_checksum(&[0xF0, 0x0F]), 0xFF);
        assert_eq!(xor_checksum(b"AA"), 0);
    }

    #[test]
    fn test_failure_propagates() {
        let err = MachineIdentity::derive(&FailingSource).unwrap_err();
        assert!(matches!(err, PrefMacError::IdentityUnavailable(_)));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_system_source_unavailable_off_windows() {
        let source = SystemIdentitySource::new(Some("host".to_string()), "/");
        assert!(matches!(
            source.security_identifier(),
            Err(PrefMacError::IdentityUnavailable(_))
        ));
        assert!(matches!(
            source.volume_serial(),
            Err(PrefMacError::IdentityUnavailable(_))
        ));
    }
}
