//! Cache port for catalog snapshots.
//!
//! The catalog cache talks to storage only through [`CacheStore`], so the
//! backing can be in-memory (one admin session), a JSON file (shared across
//! CLI invocations) or disabled (tests, `--no-cache`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::ScopeError;
use crate::types::CatalogSnapshot;

/// Fixed identifier of the catalog entry.
pub const CATALOG_CACHE_ID: &str = "reposcope.repository-catalog";
/// Bumped whenever the cached snapshot layout changes.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Store key for the current schema version.
pub fn catalog_cache_key() -> String {
    format!("{CATALOG_CACHE_ID}:v{CACHE_SCHEMA_VERSION}")
}

/// One cached snapshot with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u32,
    pub stored_at: DateTime<Utc>,
    pub snapshot: CatalogSnapshot,
}

impl CacheEntry {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            version: CACHE_SCHEMA_VERSION,
            stored_at: snapshot.fetched_at,
            snapshot,
        }
    }
}

/// Key/value storage for cache entries.
pub trait CacheStore: Send + Sync {
    /// `Err(CacheCorrupt)` when an entry exists but cannot be decoded.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, ScopeError>;

    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), ScopeError>;

    fn remove(&self, key: &str);

    /// An entry is valid while `0 <= age < ttl` and its schema matches.
    fn is_valid(&self, entry: &CacheEntry, now: DateTime<Utc>, ttl: Duration) -> bool {
        if entry.version != CACHE_SCHEMA_VERSION {
            return false;
        }
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return true;
        };
        let age = now.signed_duration_since(entry.stored_at);
        age >= chrono::Duration::zero() && age < ttl
    }
}

// ── In-memory ──────────────────────────────────────────────────────────────

/// Process-local store, scoped to one engine instance.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, ScopeError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), ScopeError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }
}

// ── File-backed ────────────────────────────────────────────────────────────

/// JSON file holding a map of key to entry.
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, serde_json::Value>, ScopeError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(ScopeError::cache_corrupt(format!("{:?}: {e}", self.path))),
        };
        serde_json::from_str(&raw)
            .map_err(|e| ScopeError::cache_corrupt(format!("{:?}: {e}", self.path)))
    }

    fn write_all(&self, entries: &HashMap<String, serde_json::Value>) -> Result<(), ScopeError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ScopeError::cache_corrupt(format!("{:?}: {e}", parent)))?;
        }
        let body = serde_json::to_vec(entries).map_err(ScopeError::cache_corrupt)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| ScopeError::cache_corrupt(format!("{:?}: {e}", self.path)))
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, ScopeError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let entries = self.read_all()?;
        match entries.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ScopeError::cache_corrupt(format!("entry {key}: {e}"))),
        }
    }

    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), ScopeError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        // A corrupt file is overwritten rather than blocking every future write.
        let mut entries = self.read_all().unwrap_or_default();
        let value = serde_json::to_value(&entry).map_err(ScopeError::cache_corrupt)?;
        entries.insert(key.to_string(), value);
        self.write_all(&entries)?;
        debug!("Wrote catalog cache entry {} to {:?}", key, self.path);
        Ok(())
    }

    fn remove(&self, key: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(mut entries) = self.read_all() {
            if entries.remove(key).is_some() {
                if let Err(e) = self.write_all(&entries) {
                    warn!("Failed to drop catalog cache entry {}: {}", key, e);
                }
            }
        }
    }
}

// ── Disabled ───────────────────────────────────────────────────────────────

/// Never holds anything; every read is a miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCacheStore;

impl CacheStore for DisabledCacheStore {
    fn get(&self, _key: &str) -> Result<Option<CacheEntry>, ScopeError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _entry: CacheEntry) -> Result<(), ScopeError> {
        Ok(())
    }

    fn remove(&self, _key: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectRecord;
    use chrono::TimeZone;

    fn entry_at(ms: i64) -> CacheEntry {
        let at = Utc.timestamp_millis_opt(ms).unwrap();
        CacheEntry::new(CatalogSnapshot::new(
            at,
            vec![ProjectRecord::new("P1", "One").with_repository("r1", "Repo 1")],
        ))
    }

    #[test]
    fn validity_window_is_half_open() {
        let store = MemoryCacheStore::new();
        let entry = entry_at(1_000_000);
        let ttl = Duration::from_millis(300_000);
        let at = |ms: i64| Utc.timestamp_millis_opt(1_000_000 + ms).unwrap();

        assert!(store.is_valid(&entry, at(0), ttl));
        assert!(store.is_valid(&entry, at(299_999), ttl));
        assert!(!store.is_valid(&entry, at(300_000), ttl));
        assert!(!store.is_valid(&entry, at(300_001), ttl));
        assert!(!store.is_valid(&entry, at(-1), ttl));
    }

    #[test]
    fn schema_mismatch_is_invalid() {
        let store = MemoryCacheStore::new();
        let mut entry = entry_at(0);
        entry.version = CACHE_SCHEMA_VERSION + 1;
        let now = entry.stored_at;
        assert!(!store.is_valid(&entry, now, Duration::from_secs(60)));
    }

    #[test]
    fn memory_store_round_trips_and_removes() {
        let store = MemoryCacheStore::new();
        let key = catalog_cache_key();
        assert!(store.get(&key).unwrap().is_none());
        store.set(&key, entry_at(5)).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(entry_at(5)));
        store.remove(&key);
        assert!(store.get(&key).unwrap().is_none());
    }

    #[test]
    fn file_store_persists_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("catalog.json");
        let key = catalog_cache_key();

        FileCacheStore::new(&path).set(&key, entry_at(42)).unwrap();
        let reopened = FileCacheStore::new(&path);
        assert_eq!(reopened.get(&key).unwrap(), Some(entry_at(42)));
    }

    #[test]
    fn file_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileCacheStore::new(&path);
        let err = store.get(&catalog_cache_key()).unwrap_err();
        assert!(matches!(err, ScopeError::CacheCorrupt { .. }));

        // Writing replaces the corrupt file.
        store.set(&catalog_cache_key(), entry_at(1)).unwrap();
        assert!(store.get(&catalog_cache_key()).unwrap().is_some());
    }

    #[test]
    fn file_store_reports_malformed_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let key = catalog_cache_key();
        std::fs::write(&path, format!("{{\"{key}\": {{\"version\": \"one\"}}}}")).unwrap();

        let err = FileCacheStore::new(&path).get(&key).unwrap_err();
        assert!(matches!(err, ScopeError::CacheCorrupt { .. }));
    }

    #[test]
    fn file_store_remove_drops_only_that_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let store = FileCacheStore::new(&path);
        store.set("a", entry_at(1)).unwrap();
        store.set("b", entry_at(2)).unwrap();

        store.remove("a");
        store.remove("missing");
        assert!(store.get("a").unwrap().is_none());
        assert_eq!(store.get("b").unwrap(), Some(entry_at(2)));
    }

    #[test]
    fn file_store_remove_survives_failed_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let store = FileCacheStore::new(&path);
        store.set("a", entry_at(1)).unwrap();

        // The temp file path is taken by a directory, so the rewrite fails.
        std::fs::create_dir(path.with_extension("tmp")).unwrap();
        store.remove("a");
        assert_eq!(store.get("a").unwrap(), Some(entry_at(1)));
    }

    #[test]
    fn disabled_store_never_hits() {
        let store = DisabledCacheStore;
        store.set("k", entry_at(0)).unwrap();
        assert!(store.get("k").unwrap().is_none());
    }
}
