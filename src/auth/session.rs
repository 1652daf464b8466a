//! Local catalog session storage (desktop mode).
//!
//! A prior interactive login persists a session file under the user config
//! directory. This layer only reads it; login flows live in the desktop
//! client. HTTP mode never touches the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// A persisted catalog login session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSession {
    /// Catalog UI URL this session belongs to
    pub catalog_url: String,
    /// Registry API URL
    pub registry_url: String,
    /// Catalog bearer token from the interactive login
    pub access_token: String,
    /// When the session expires
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl LocalSession {
    /// Check if the session is expired (with 60 second buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now() + chrono::Duration::seconds(60) >= at)
    }
}

/// Default session file location (`~/.config/catalog-gateway/session.json`).
#[must_use]
pub fn default_session_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("catalog-gateway").join("session.json"))
}

/// Load a session file, if one exists and is still valid.
///
/// A missing file is `Ok(None)` — desktop mode without a prior login is a
/// legitimate state (catalog operations then fail loudly with a
/// re-authenticate hint). An expired session is also `Ok(None)`.
///
/// # Errors
///
/// Returns an error only when the file exists but cannot be read or parsed.
pub fn load_session(path: &Path) -> Result<Option<LocalSession>> {
    if !path.exists() {
        debug!(path = %path.display(), "No local catalog session");
        return Ok(None);
    }

    let raw = fs::read_to_string(path)?;
    let session: LocalSession = serde_json::from_str(&raw)?;

    if session.is_expired() {
        debug!(path = %path.display(), "Local catalog session expired");
        return Ok(None);
    }

    Ok(Some(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_session(dir: &Path, session: &LocalSession) -> PathBuf {
        let path = dir.join("session.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(f, "{}", serde_json::to_string(session).unwrap()).unwrap();
        path
    }

    #[test]
    fn missing_file_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_session(&dir.path().join("absent.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn valid_session_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            &LocalSession {
                catalog_url: "https://catalog.example.com".into(),
                registry_url: "https://registry.example.com".into(),
                access_token: "session-token".into(),
                expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            },
        );

        let session = load_session(&path).unwrap().expect("session");
        assert_eq!(session.access_token, "session-token");
    }

    #[test]
    fn expired_session_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            &LocalSession {
                catalog_url: "https://catalog.example.com".into(),
                registry_url: "https://registry.example.com".into(),
                access_token: "stale".into(),
                expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            },
        );

        assert!(load_session(&path).unwrap().is_none());
    }

    #[test]
    fn session_without_expiry_never_expires() {
        let session = LocalSession {
            catalog_url: String::new(),
            registry_url: String::new(),
            access_token: "t".into(),
            expires_at: None,
        };
        assert!(!session.is_expired());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        assert!(load_session(&path).is_err());
    }
}
