//! Persistent key/value storage for client state.
//!
//! Holds the credential pair and the active session id in
//! `<dir>/storage.json`, written with owner-only permissions (0600).
//! Token values are never logged.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const STORAGE_FILE: &str = "storage.json";

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const ACTIVE_SESSION_KEY: &str = "activeSessionId";

#[derive(Clone, Default)]
pub struct LocalStorage {
    /// `None` keeps everything in memory
    path: Option<PathBuf>,
    entries: BTreeMap<String, String>,
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage")
            .field("path", &self.path)
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LocalStorage {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads storage from `path`. A missing file yields empty storage bound to that path.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read storage from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse storage from {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.get(REFRESH_TOKEN_KEY)
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.get(ACTIVE_SESSION_KEY)
    }

    /// Writes the current entries to disk. No-op for in-memory storage.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(&self.entries).context("Failed to serialize storage")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to open {} for writing", path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        #[cfg(not(unix))]
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .with_context(|| format!("Failed to open {} for writing", path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::load(dir.path().join(STORAGE_FILE)).unwrap();
        assert!(storage.access_token().is_none());
        assert!(storage.active_session_id().is_none());
    }

    #[test]
    fn test_round_trip_uses_expected_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(STORAGE_FILE);

        let mut storage = LocalStorage::load(&path).unwrap();
        storage.set(ACCESS_TOKEN_KEY, "a1");
        storage.set(REFRESH_TOKEN_KEY, "r1");
        storage.set(ACTIVE_SESSION_KEY, "42");
        storage.save().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["access_token"], "a1");
        assert_eq!(raw["refresh_token"], "r1");
        assert_eq!(raw["activeSessionId"], "42");

        let reloaded = LocalStorage::load(&path).unwrap();
        assert_eq!(reloaded.access_token(), Some("a1"));
        assert_eq!(reloaded.refresh_token(), Some("r1"));
        assert_eq!(reloaded.active_session_id(), Some("42"));
    }

    #[test]
    fn test_remove_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(STORAGE_FILE);

        let mut storage = LocalStorage::load(&path).unwrap();
        storage.set(ACCESS_TOKEN_KEY, "a1");
        storage.save().unwrap();
        assert_eq!(storage.remove(ACCESS_TOKEN_KEY).as_deref(), Some("a1"));
        storage.save().unwrap();

        assert!(LocalStorage::load(&path).unwrap().access_token().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(STORAGE_FILE);
        let mut storage = LocalStorage::load(&path).unwrap();
        storage.set(ACCESS_TOKEN_KEY, "secret");
        storage.save().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let mut storage = LocalStorage::in_memory();
        storage.set(ACCESS_TOKEN_KEY, "a1");
        storage.save().unwrap();
        assert!(storage.path().is_none());
        assert_eq!(storage.access_token(), Some("a1"));
    }
}
