//! Local key-value cache of display-model snapshots.
//!
//! The store itself is a dumb string-keyed, string-valued map behind the
//! [`KvStore`] trait; [`WeatherCache`] layers the timestamped entry envelope
//! and the freshness rule on top. A corrupt stored value is treated as a
//! cache miss, never as an error.

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};

use crate::model::{CacheEntry, DisplayModel};

/// How long a cached snapshot is served without waiting on the network.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Synchronous string key-value store. Capacity and eviction belong to the
/// backing medium; writes are whole-value overwrites.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// A shared handle to a store is itself a store, so callers can keep a
/// handle to inspect what the cache wrote.
impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// In-memory store, used by tests and embedders that do not want disk I/O.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed store: one JSON map persisted under the platform data
/// directory. Every write rewrites the whole map, which keeps concurrent
/// same-key writes last-write-wins with no partial updates.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        FileStore { path }
    }

    /// Open the store at its default platform location.
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "skycast", "skycast")
            .ok_or_else(|| anyhow!("Could not determine platform data directory"))?;

        Ok(FileStore::new(dirs.data_local_dir().join("cache.json")))
    }

    fn read_map(&self) -> HashMap<String, String> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            // First run or unreadable file: start empty.
            return HashMap::new();
        };

        match serde_json::from_str(&contents) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "discarding unreadable cache file");
                HashMap::new()
            }
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string(map).context("Failed to serialize cache contents")?;

        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache file: {}", self.path.display()))?;

        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_map().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }
}

/// Cache of [`DisplayModel`] snapshots keyed by [`Query::cache_key`].
///
/// [`Query::cache_key`]: crate::model::Query::cache_key
pub struct WeatherCache {
    store: Box<dyn KvStore>,
}

impl WeatherCache {
    pub fn new(store: Box<dyn KvStore>) -> Self {
        WeatherCache { store }
    }

    /// Read the entry for `key`, regardless of age. A malformed stored value
    /// is logged and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let raw = self.store.get(key)?;

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(key, %err, "discarding malformed cache entry");
                None
            }
        }
    }

    /// Read the entry for `key` only if it is younger than `window`.
    pub fn fresh(&self, key: &str, window: Duration) -> Option<DisplayModel> {
        let entry = self.get(key)?;

        if entry.is_fresh(window) {
            tracing::debug!(key, "serving fresh cache entry");
            Some(entry.data)
        } else {
            tracing::debug!(key, age_secs = entry.age().as_secs(), "cache entry is stale");
            None
        }
    }

    /// Overwrite the entry for `key` with `model`, stamped now.
    pub fn set(&self, key: &str, model: &DisplayModel) -> Result<()> {
        let entry = CacheEntry::new(model.clone());
        let json = serde_json::to_string(&entry).context("Failed to serialize cache entry")?;

        self.store.set(key, &json)
    }
}
