//! Startup page edits.
//!
//! Setting a startup page touches four protected preferences, so the
//! document must be re-signed afterwards.

use crate::models::Result;
use crate::path::FieldPath;
use serde_json::{json, Value};
use tracing::info;

/// `session.restore_on_startup` value meaning "open a specific set of pages".
pub const RESTORE_ON_STARTUP_URLS: i64 = 4;

/// Paths written by [`set_startup_page`].
pub const STARTUP_PATHS: [&str; 4] = [
    "session.restore_on_startup",
    "session.startup_urls",
    "homepage",
    "homepage_is_newtabpage",
];

/// Makes `url` the only startup page and the home page.
///
/// Existing startup URLs are replaced. Other content, including the order of
/// existing keys, is left alone.
///
/// # Errors
///
/// Returns `PrefMacError::InvalidPath` if `session` exists but is not an
/// object.
///
/// # Example
///
/// ```rust
/// use prefmac_core::startup::set_startup_page;
/// use serde_json::json;
///
/// let mut prefs = json!({"session": {"startup_urls": ["https://old.example/"]}});
/// set_startup_page(&mut prefs, "https://new.example/").unwrap();
/// assert_eq!(prefs["session"]["startup_urls"], json!(["https://new.example/"]));
/// assert_eq!(prefs["homepage_is_newtabpage"], json!(false));
/// ```
pub fn set_startup_page(document: &mut Value, url: &str) -> Result<()> {
    let values = [
        json!(RESTORE_ON_STARTUP_URLS),
        json!([url]),
        json!(url),
        json!(false),
    ];
    for (path, value) in STARTUP_PATHS.iter().zip(values) {
        FieldPath::parse(path)?.set(document, value)?;
    }
    info!(url, "set startup page");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PrefMacError;

    #[test]
    fn test_sets_all_fields() {
        let mut prefs = json!({});
        set_startup_page(&mut prefs, "https://example.com/").unwrap();
        assert_eq!(
            prefs,
            json!({
                "session": {
                    "restore_on_startup": 4,
                    "startup_urls": ["https://example.com/"]
                },
                "homepage": "https://example.com/",
                "homepage_is_newtabpage": false
            })
        );
    }

    #[test]
    fn test_replaces_existing_values_in_place() {
        let mut prefs = json!({
            "homepage": "https://old.example/",
            "session": {"restore_on_startup": 1, "startup_urls": ["a", "b"], "other": 7},
            "homepage_is_newtabpage": true
        });
        set_startup_page(&mut prefs, "https://new.example/").unwrap();

        assert_eq!(
            serde_json::to_string(&prefs).unwrap(),
            r#"{"homepage":"https://new.example/","session":{"restore_on_startup":4,"startup_urls":["https://new.example/"],"other":7},"homepage_is_newtabpage":false}"#
        );
    }

    #[test]
    fn test_rejects_scalar_session() {
        let mut prefs = json!({"session": 3});
        let err = set_startup_page(&mut prefs, "https://example.com/").unwrap_err();
        assert!(matches!(err, PrefMacError::InvalidPath { .. }));
    }
}
