//! Cross-page-load persistence for MPA-mode assertions.
//!
//! The [`Storage`] trait is the injected seam standing in for whatever
//! key-value store the host has. Load is read-once: the key is cleared as
//! soon as it is read, so a persisted batch is only ever adopted by one
//! page load. Store appends to whatever is already persisted rather than
//! overwriting it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::assertion::Assertion;
use crate::config::STORAGE_KEY;
use crate::result::{VigilarError, VigilarResult};

/// Injected key-value persistence seam.
pub trait Storage: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns [`VigilarError::Storage`] when the backing store fails.
    fn get(&self, key: &str) -> VigilarResult<Option<String>>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns [`VigilarError::Storage`] when the backing store fails.
    fn set(&self, key: &str, value: &str) -> VigilarResult<()>;

    /// Delete a value; deleting a missing key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`VigilarError::Storage`] when the backing store fails.
    fn remove(&self, key: &str) -> VigilarResult<()>;
}

/// In-memory storage, the default when no persistence is injected.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> VigilarResult<Option<String>> {
        Ok(self.values.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> VigilarResult<()> {
        self.values
            .lock()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> VigilarResult<()> {
        self.values.lock().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> VigilarError {
    VigilarError::Storage {
        message: "storage lock poisoned".to_string(),
    }
}

/// File-backed storage keeping one file per key under a directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> VigilarResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> VigilarResult<Option<String>> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> VigilarResult<()> {
        std::fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> VigilarResult<()> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Load persisted assertions, clearing the key so the batch is adopted
/// exactly once. Unreadable or unparsable state is dropped with a warning
/// rather than surfacing to the host page.
pub fn load_assertions(storage: &dyn Storage) -> Vec<Assertion> {
    let data = match storage.get(STORAGE_KEY) {
        Ok(Some(data)) => data,
        Ok(None) => return Vec::new(),
        Err(err) => {
            tracing::warn!("failed to read persisted assertions: {err}");
            return Vec::new();
        }
    };
    if let Err(err) = storage.remove(STORAGE_KEY) {
        tracing::warn!("failed to clear persisted assertions: {err}");
    }
    match serde_json::from_str(&data) {
        Ok(assertions) => assertions,
        Err(err) => {
            tracing::warn!("discarding unparsable persisted assertions: {err}");
            Vec::new()
        }
    }
}

/// Persist assertions, appending to any already-persisted batch. Storing an
/// empty slice is a no-op.
pub fn store_assertions(storage: &dyn Storage, assertions: &[Assertion]) {
    if assertions.is_empty() {
        return;
    }
    let mut combined: Vec<Assertion> = match storage.get(STORAGE_KEY) {
        Ok(Some(data)) => serde_json::from_str(&data).unwrap_or_default(),
        Ok(None) => Vec::new(),
        Err(err) => {
            tracing::warn!("failed to read persisted assertions: {err}");
            Vec::new()
        }
    };
    combined.extend_from_slice(assertions);
    match serde_json::to_string(&combined) {
        Ok(data) => {
            if let Err(err) = storage.set(STORAGE_KEY, &data) {
                tracing::warn!("failed to persist assertions: {err}");
            }
        }
        Err(err) => tracing::warn!("failed to encode assertions for persistence: {err}"),
    }
}
