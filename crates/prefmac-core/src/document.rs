//! Reading, writing and locking preference documents on disk.

use crate::models::{PrefMacError, Result};
use fs2::FileExt;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Parses the JSON document at `path`.
///
/// # Errors
///
/// `PrefMacError::Io` if the file cannot be read and
/// `PrefMacError::DocumentParse` if it is not JSON.
pub fn load_document<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let document = serde_json::from_str(&text)
        .map_err(|e| PrefMacError::DocumentParse(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), bytes = text.len(), "loaded document");
    Ok(document)
}

/// Writes `document` to `path` in compact form.
///
/// With `backup` set, an existing file is first copied to `<path>.bak`.
/// The new content goes to a sibling temporary file that is then renamed
/// over `path`.
pub fn save_document<P: AsRef<Path>>(path: P, document: &Value, backup: bool) -> Result<()> {
    let path = path.as_ref();
    if backup && path.exists() {
        let backup_path = sibling(path, "bak");
        fs::copy(path, &backup_path)?;
        debug!(path = %backup_path.display(), "wrote backup");
    }

    let text = serde_json::to_string(document)?;
    let staging = sibling(path, "tmp");
    fs::write(&staging, text.as_bytes())?;
    fs::rename(&staging, path)?;
    info!(path = %path.display(), bytes = text.len(), "saved document");
    Ok(())
}

/// `<path>.<ext>`, keeping the original extension.
fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Exclusive advisory lock held for the length of a run.
///
/// The lock lives on `<document>.lock` rather than the document, which is
/// replaced by rename on save. Released on drop.
#[derive(Debug)]
pub struct DocumentLock {
    file: File,
    path: PathBuf,
}

impl DocumentLock {
    /// Takes the lock for `document`, failing immediately if it is held.
    ///
    /// # Errors
    ///
    /// `PrefMacError::StoreUnavailable` if another process holds the lock.
    pub fn acquire<P: AsRef<Path>>(document: P) -> Result<Self> {
        let path = sibling(document.as_ref(), "lock");
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive().map_err(|e| {
            PrefMacError::StoreUnavailable(format!(
                "{} is locked by another process: {e}",
                path.display()
            ))
        })?;
        debug!(path = %path.display(), "acquired document lock");
        Ok(Self { file, path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock anyway.
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Preferences");
        let doc = json!({"homepage": "https://example.com/", "b": [1, 2]});

        save_document(&path, &doc, false).unwrap();
        assert_eq!(load_document(&path).unwrap(), doc);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{"homepage":"https://example.com/","b":[1,2]}"#
        );
        assert!(!dir.path().join("Preferences.bak").exists());
        assert!(!dir.path().join("Preferences.tmp").exists());
    }

    #[test]
    fn test_backup_keeps_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Secure Preferences");
        fs::write(&path, r#"{"old":true}"#).unwrap();

        save_document(&path, &json!({"new": true}), true).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("Secure Preferences.bak")).unwrap(),
            r#"{"old":true}"#
        );
        assert_eq!(load_document(&path).unwrap(), json!({"new": true}));
    }

    #[test]
    fn test_backup_skipped_for_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Preferences");
        save_document(&path, &json!({}), true).unwrap();
        assert!(!dir.path().join("Preferences.bak").exists());
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();
        let missing = load_document(dir.path().join("absent")).unwrap_err();
        assert!(matches!(missing, PrefMacError::Io(_)));

        let path = dir.path().join("Preferences");
        fs::write(&path, "{not json").unwrap();
        let err = load_document(&path).unwrap_err();
        assert!(matches!(err, PrefMacError::DocumentParse(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("Preferences");

        let lock = DocumentLock::acquire(&doc).unwrap();
        assert_eq!(lock.path(), dir.path().join("Preferences.lock"));
        assert!(matches!(
            DocumentLock::acquire(&doc),
            Err(PrefMacError::StoreUnavailable(_))
        ));

        drop(lock);
        assert!(DocumentLock::acquire(&doc).is_ok());
    }
}
