//! Persisted user preferences (currently the invoice list page size).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use thiserror::Error;

pub const PAGE_SIZE_KEY: &str = "invoiceList.pageSize";
pub const PAGE_SIZE_OPTIONS: [u32; 4] = [10, 20, 50, 100];
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("preference storage unavailable: {0:#}")]
    Io(anyhow::Error),
    #[error("preference file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// String key/value storage for preferences.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A flat JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/tradedesk/preferences.json`.
    pub fn default_location() -> anyhow::Result<PathBuf> {
        let base = dirs::config_dir().context("no platform config directory available")?;
        Ok(base.join("tradedesk").join("preferences.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, PreferenceError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read preferences at {:?}", self.path))
            .map_err(PreferenceError::Io)?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl PreferenceStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create preference directory at {:?}", parent))
                .map_err(PreferenceError::Io)?;
        }
        let text = serde_json::to_string_pretty(&values)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to write preferences at {:?}", self.path))
            .map_err(PreferenceError::Io)
    }
}

/// Snap an arbitrary value to the nearest allowed page size.
pub fn normalize_page_size(value: u32) -> u32 {
    PAGE_SIZE_OPTIONS
        .iter()
        .copied()
        .min_by_key(|option| option.abs_diff(value))
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

/// The invoice list page size, backed by any [`PreferenceStore`].
pub struct PageSizePreference<S> {
    store: S,
}

impl<S: PreferenceStore> PageSizePreference<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stored value, or the default when missing or unreadable.
    pub fn load(&self) -> u32 {
        let stored = match self.store.get(PAGE_SIZE_KEY) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "could not read page size preference");
                None
            }
        };
        stored
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|size| PAGE_SIZE_OPTIONS.contains(size))
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Persist `size` (snapped to an allowed option) and return what was stored.
    pub fn save(&self, size: u32) -> Result<u32, PreferenceError> {
        let size = normalize_page_size(size);
        self.store.set(PAGE_SIZE_KEY, &size.to_string())?;
        tracing::debug!(page_size = size, "page size preference saved");
        Ok(size)
    }
}
