//! Seed extraction from the browser's resource container file.
//!
//! The MAC key material is the first [`SEED_LEN`] bytes of the container.
//! Two key encodings exist downstream and both are supported; see
//! [`SeedEncoding`].

use crate::models::{PrefMacError, Result, SEED_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::debug;

/// How the seed bytes become the HMAC key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedEncoding {
    /// The 64 bytes as read.
    Raw,

    /// UTF-8 bytes of the 128-character uppercase hex rendering.
    #[default]
    HexText,
}

/// Fixed-length key material. Never logged or persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    /// Reads the first [`SEED_LEN`] bytes of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `PrefMacError::SeedSourceMissing` when the file cannot be
    /// opened or holds fewer than [`SEED_LEN`] bytes.
    pub fn extract<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let missing = |reason: String| PrefMacError::SeedSourceMissing {
            path: path.to_path_buf(),
            reason,
        };

        let mut file = File::open(path).map_err(|e| missing(e.to_string()))?;
        let mut buffer = [0u8; SEED_LEN];
        file.read_exact(&mut buffer).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => missing(format!("file is shorter than {SEED_LEN} bytes")),
            _ => missing(e.to_string()),
        })?;

        debug!(path = %path.display(), "extracted seed");
        Ok(Seed(buffer))
    }

    /// Wraps seed bytes obtained elsewhere.
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Seed(bytes)
    }

    /// The raw seed bytes.
    pub fn raw(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    /// Uppercase hex rendering, 128 characters.
    pub fn hex_text(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// HMAC key bytes for the selected encoding.
    pub fn key_bytes(&self, encoding: SeedEncoding) -> Vec<u8> {
        match encoding {
            SeedEncoding::Raw => self.0.to_vec(),
            SeedEncoding::HexText => self.hex_text().into_bytes(),
        }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn seed_file(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_extract_reads_first_64_bytes() {
        let bytes: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        let file = seed_file(&bytes);

        let seed = Seed::extract(file.path()).unwrap();
        assert_eq!(&seed.raw()[..], &bytes[..SEED_LEN]);
    }

    #[test]
    fn test_extract_exactly_64_bytes() {
        let file = seed_file(&[7u8; SEED_LEN]);
        let seed = Seed::extract(file.path()).unwrap();
        assert_eq!(seed.raw(), &[7u8; SEED_LEN]);
    }

    #[test]
    fn test_short_file_is_missing_seed() {
        let file = seed_file(&[1u8; SEED_LEN - 1]);
        let err = Seed::extract(file.path()).unwrap_err();
        assert!(matches!(err, PrefMacError::SeedSourceMissing { .. }));
    }

    #[test]
    fn test_absent_file_is_missing_seed() {
        let dir = tempfile::tempdir().unwrap();
        let err = Seed::extract(dir.path().join("resources.pak")).unwrap_err();
        assert!(matches!(err, PrefMacError::SeedSourceMissing { .. }));
    }

    #[test]
    fn test_hex_text_form() {
        let mut bytes = [0u8; SEED_LEN];
        bytes[0] = 0xAB;
        bytes[63] = 0x0c;
        let seed = Seed::from_bytes(bytes);

        let text = seed.hex_text();
        assert_eq!(text.len(), 128);
        assert!(text.starts_with("AB00"));
        assert!(text.ends_with("000C"));
    }

    #[test]
    fn test_key_bytes_variants() {
        let seed = Seed::from_bytes([0u8; SEED_LEN]);
        assert_eq!(seed.key_bytes(SeedEncoding::Raw), vec![0u8; 64]);
        assert_eq!(seed.key_bytes(SeedEncoding::HexText), vec![b'0'; 128]);
    }

    #[test]
    fn test_debug_is_redacted() {
        let seed = Seed::from_bytes([0x41u8; SEED_LEN]);
        assert_eq!(format!("{seed:?}"), "Seed(<redacted>)");
    }
}
