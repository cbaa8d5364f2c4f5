//! Storage Layer
//!
//! Templates persist as one JSON blob under a single key. The blob lives in
//! a [`KeyValueStore`]: JSON files, SQLite, or memory for tests.

pub mod database;
pub mod templates;

pub use database::SqliteStore;
pub use templates::{NewTemplate, StorageError, Template, TemplateRepository, TemplateUpdate};

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::{StorageBackend, StorageConfig};

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "paperocr", "paper-ocr")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    let data_dir = proj_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "paperocr", "paper-ocr")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Low-level key-value store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Storage quota exceeded")]
    QuotaExceeded,
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// String key-value persistence
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// In-memory store with optional failure injection
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    fail_writes: bool,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail as unavailable
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Reject writes whose value exceeds `bytes`
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        if self.quota.is_some_and(|q| value.len() > q) {
            return Err(StoreError::QuotaExceeded);
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        debug!("Wrote {} bytes to {:?}", value.len(), path);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Open the configured backend inside `data_dir`
pub fn open_store(config: &StorageConfig, data_dir: &Path) -> Result<Box<dyn KeyValueStore>> {
    let store: Box<dyn KeyValueStore> = match config.backend {
        StorageBackend::Json => Box::new(JsonFileStore::new(data_dir)?),
        StorageBackend::Sqlite => Box::new(SqliteStore::open(&data_dir.join("paper-ocr.db"))?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_file_store() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(dir.path()).unwrap();

        assert_eq!(store.get("paper-ocr-templates").unwrap(), None);

        store.set("paper-ocr-templates", "[]").unwrap();
        assert_eq!(store.get("paper-ocr-templates").unwrap().as_deref(), Some("[]"));
        assert!(dir.path().join("paper-ocr-templates.json").exists());

        store.remove("paper-ocr-templates").unwrap();
        assert_eq!(store.get("paper-ocr-templates").unwrap(), None);
        // Removing twice is fine
        store.remove("paper-ocr-templates").unwrap();
    }

    #[test]
    fn test_json_file_store_sanitizes_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(dir.path()).unwrap();

        store.set("../escape", "x").unwrap();
        assert!(dir.path().join("___escape.json").exists());
    }

    #[test]
    fn test_memory_store_failures() {
        let mut store = MemoryStore::new().with_quota(4);
        store.set("k", "1234").unwrap();
        assert!(matches!(store.set("k", "12345"), Err(StoreError::QuotaExceeded)));

        store.fail_writes(true);
        assert!(matches!(store.set("k", "1"), Err(StoreError::Unavailable(_))));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("1234"));
    }

    #[test]
    fn test_open_store_backends() {
        let dir = TempDir::new().unwrap();
        let mut config = StorageConfig::default();

        let mut json = open_store(&config, dir.path()).unwrap();
        json.set("a", "1").unwrap();
        assert_eq!(json.get("a").unwrap().as_deref(), Some("1"));

        config.backend = StorageBackend::Sqlite;
        let mut sqlite = open_store(&config, dir.path()).unwrap();
        sqlite.set("a", "2").unwrap();
        assert_eq!(sqlite.get("a").unwrap().as_deref(), Some("2"));
        assert!(dir.path().join("paper-ocr.db").exists());
    }
}
