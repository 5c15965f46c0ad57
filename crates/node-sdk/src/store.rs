//! Durable key-value settings store.
//!
//! Holds the small set of values that must survive restarts: the device
//! identifier, the opt-in flag, and the rate-limit counters. Hosts can plug
//! their own backend; the SDK ships an in-memory store for tests and a
//! write-through JSON file store for real deployments.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use forager_domain::{Error, Result};

// ── Well-known keys ──────────────────────────────────────────────────

pub const KEY_DEVICE_ID: &str = "device_id";
pub const KEY_OPTED_IN: &str = "opted_in";
pub const KEY_METADATA_ID: &str = "metadata_id";
pub const KEY_RATE_WINDOW_START: &str = "rate_window_start";
pub const KEY_RATE_COUNT: &str = "rate_count";

/// Host-pluggable persistence boundary. Values are strings; callers parse
/// at the use site.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Volatile store for tests and throwaway hosts.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON file store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Settings persisted to one JSON file, written through on every mutation.
///
/// The value set is tiny (five keys) and mutations are rare outside of
/// rate-limit increments, so a full rewrite per `set` is fine.
pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Load or create the settings file at `path`. A corrupt file is
    /// treated as empty rather than refusing to start.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(Error::Io)?;
        }

        let values = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), "settings store loaded");

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    fn flush_locked(&self, values: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| Error::Store(format!("serializing settings: {e}")))?;
        std::fs::write(&self.path, json).map_err(Error::Io)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write();
        values.insert(key.to_owned(), value.to_owned());
        self.flush_locked(&values)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.write();
        if values.remove(key).is_some() {
            self.flush_locked(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k"), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.delete("k").unwrap();
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set(KEY_DEVICE_ID, "frgr_demo_abc123").unwrap();
        store.set(KEY_OPTED_IN, "true").unwrap();
        drop(store);

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get(KEY_DEVICE_ID).as_deref(), Some("frgr_demo_abc123"));
        assert_eq!(store.get(KEY_OPTED_IN).as_deref(), Some("true"));
    }

    #[test]
    fn file_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get(KEY_DEVICE_ID), None);
        store.set(KEY_DEVICE_ID, "frgr_demo_x").unwrap();
        assert_eq!(store.get(KEY_DEVICE_ID).as_deref(), Some("frgr_demo_x"));
    }

    #[test]
    fn delete_removes_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set(KEY_METADATA_ID, "m1").unwrap();
        store.delete(KEY_METADATA_ID).unwrap();
        drop(store);

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get(KEY_METADATA_ID), None);
    }
}
