//! Content-addressed result cache
//!
//! Keys are a pure function of (url, content hash, prompt version). Entries are
//! written once with put-if-absent and never updated in place: writing an equal
//! payload again is a no-op, a different payload under the same key is a
//! [`CacheError::KeyCollision`].
//!
//! Keys pinned by an in-flight page run survive pruning. Pins are recorded in
//! the store, so a prune from another process sharing a cache directory sees
//! them too; a pin older than [`STALE_PIN_SECS`] is treated as left behind by a
//! crashed run and cleared.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Hex SHA-256 over url, content hash and prompt version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(url: &str, content: &str, prompt_version: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update([0u8]);
        hasher.update(content_hash(content).as_bytes());
        hasher.update([0u8]);
        hasher.update(prompt_version.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Accepts only the 64-char lowercase hex form produced by [`CacheKey::derive`]
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == 64
            && value
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex SHA-256 of a content string
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, payload: Value) -> Self {
        Self {
            key,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Pins older than this are considered abandoned
pub const STALE_PIN_SECS: i64 = 6 * 60 * 60;

/// One holder's pin on a key, as recorded in a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub key: CacheKey,
    pub holder: String,
    pub pinned_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache key collision: {key} already holds a different payload")]
    KeyCollision { key: CacheKey },

    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cache entry could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Storage backend for the cache
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Store `entry` unless its key exists; returns the existing entry otherwise.
    /// Must be atomic with respect to concurrent callers.
    fn insert_if_absent(&self, entry: CacheEntry) -> Result<Option<CacheEntry>, CacheError>;

    fn entries(&self) -> Result<Vec<CacheEntry>, CacheError>;

    /// Returns false when the key was not present
    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Record that `holder` references `key`
    fn pin(&self, key: &CacheKey, holder: &str) -> Result<(), CacheError>;

    fn unpin(&self, key: &CacheKey, holder: &str) -> Result<(), CacheError>;

    /// Every pin recorded by any holder
    fn pins(&self) -> Result<Vec<PinRecord>, CacheError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: DashMap<CacheKey, CacheEntry>,
    pins: DashMap<(CacheKey, String), DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.map.get(key).map(|e| e.value().clone()))
    }

    fn insert_if_absent(&self, entry: CacheEntry) -> Result<Option<CacheEntry>, CacheError> {
        match self.map.entry(entry.key.clone()) {
            Entry::Occupied(existing) => Ok(Some(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(None)
            }
        }
    }

    fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        Ok(self.map.iter().map(|e| e.value().clone()).collect())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.map.remove(key).is_some())
    }

    fn pin(&self, key: &CacheKey, holder: &str) -> Result<(), CacheError> {
        self.pins.insert((key.clone(), holder.to_string()), Utc::now());
        Ok(())
    }

    fn unpin(&self, key: &CacheKey, holder: &str) -> Result<(), CacheError> {
        self.pins.remove(&(key.clone(), holder.to_string()));
        Ok(())
    }

    fn pins(&self) -> Result<Vec<PinRecord>, CacheError> {
        Ok(self
            .pins
            .iter()
            .map(|pin| PinRecord {
                key: pin.key().0.clone(),
                holder: pin.key().1.clone(),
                pinned_at: *pin.value(),
            })
            .collect())
    }
}

/// One JSON file per entry: `<dir>/<key>.json`, one marker per pin:
/// `<dir>/<key>.<holder>.pin`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn pin_path(&self, key: &CacheKey, holder: &str) -> PathBuf {
        self.dir.join(format!("{}.{}.pin", key, holder))
    }

    fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl CacheStore for FileStore {
    fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Self::read_entry(&self.path_for(key))
    }

    fn insert_if_absent(&self, entry: CacheEntry) -> Result<Option<CacheEntry>, CacheError> {
        let target = self.path_for(&entry.key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", entry.key, Uuid::new_v4().simple()));

        fs::write(&tmp, serde_json::to_vec_pretty(&entry)?)?;

        // hard_link fails if the target exists, which makes the publish atomic
        let linked = fs::hard_link(&tmp, &target);
        if let Err(e) = fs::remove_file(&tmp) {
            debug!("Failed to remove temp cache file {}: {}", tmp.display(), e);
        }

        match linked {
            Ok(()) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Self::read_entry(&target),
            Err(e) => Err(e.into()),
        }
    }

    fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            let is_entry = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(CacheKey::parse)
                    .is_some();
            if !is_entry {
                continue;
            }
            match Self::read_entry(&path) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable cache entry {}: {}", path.display(), e),
            }
        }
        Ok(entries)
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn pin(&self, key: &CacheKey, holder: &str) -> Result<(), CacheError> {
        let record = PinRecord {
            key: key.clone(),
            holder: holder.to_string(),
            pinned_at: Utc::now(),
        };
        fs::write(self.pin_path(key, holder), serde_json::to_vec(&record)?)?;
        Ok(())
    }

    fn unpin(&self, key: &CacheKey, holder: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.pin_path(key, holder)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn pins(&self) -> Result<Vec<PinRecord>, CacheError> {
        let mut pins = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if !path.extension().is_some_and(|ext| ext == "pin") {
                continue;
            }
            match fs::read(&path) {
                Ok(bytes) => match serde_json::from_slice::<PinRecord>(&bytes) {
                    Ok(record) => pins.push(record),
                    Err(e) => warn!("Skipping unreadable pin {}: {}", path.display(), e),
                },
                // Released between listing and reading
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(pins)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits: u64,
    misses: u64,
    writes: u64,
}

/// Snapshot of cache contents and this process's traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub pinned: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

/// Eviction limits; `None` disables a limit
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PrunePolicy {
    pub max_age: Option<Duration>,
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub removed: usize,
    pub kept: usize,
    pub skipped_pinned: usize,
}

/// Cache facade shared by the judge decorators and the orchestrator
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    /// Pin counts held by this handle and its clones
    pins: Arc<DashMap<CacheKey, usize>>,
    /// Identifies this handle's pins in the store
    holder: Arc<str>,
    counters: Arc<Mutex<Counters>>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            pins: Arc::new(DashMap::new()),
            holder: Arc::from(Uuid::new_v4().simple().to_string()),
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn open_dir(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Ok(Self::new(Arc::new(FileStore::open(dir)?)))
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        let found = self.store.load(key)?.map(|e| e.payload);
        let mut counters = self.counters.lock();
        if found.is_some() {
            counters.hits += 1;
        } else {
            counters.misses += 1;
        }
        Ok(found)
    }

    pub fn put(&self, key: &CacheKey, payload: Value) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key.clone(), payload);
        match self.store.insert_if_absent(entry.clone())? {
            None => {
                self.counters.lock().writes += 1;
                Ok(())
            }
            Some(existing) if existing.payload == entry.payload => Ok(()),
            Some(_) => Err(CacheError::KeyCollision { key: key.clone() }),
        }
    }

    /// Protect `key` from eviction, by any process sharing the store, until
    /// the guard is dropped
    pub fn pin(&self, key: &CacheKey) -> Result<PinGuard, CacheError> {
        match self.pins.entry(key.clone()) {
            Entry::Occupied(mut held) => *held.get_mut() += 1,
            Entry::Vacant(slot) => {
                // Recorded while the slot is locked so a concurrent release
                // cannot remove the marker after us
                self.store.pin(key, &self.holder)?;
                slot.insert(1);
            }
        }
        Ok(PinGuard {
            cache: self.clone(),
            key: key.clone(),
        })
    }

    fn release(&self, key: &CacheKey) {
        if let Entry::Occupied(mut held) = self.pins.entry(key.clone()) {
            *held.get_mut() -= 1;
            if *held.get() == 0 {
                if let Err(e) = self.store.unpin(key, &self.holder) {
                    warn!(key = %key, "Failed to release cache pin: {}", e);
                }
                held.remove();
            }
        }
    }

    /// Pinned by this handle
    pub fn is_pinned(&self, key: &CacheKey) -> bool {
        self.pins.contains_key(key)
    }

    /// Keys pinned by any holder, clearing pins older than [`STALE_PIN_SECS`]
    fn live_pins(&self) -> Result<HashSet<CacheKey>, CacheError> {
        let cutoff = Utc::now() - Duration::seconds(STALE_PIN_SECS);
        let mut live: HashSet<CacheKey> = self.pins.iter().map(|p| p.key().clone()).collect();
        for record in self.store.pins()? {
            if record.pinned_at < cutoff {
                warn!(
                    key = %record.key,
                    holder = %record.holder,
                    "Clearing abandoned cache pin"
                );
                self.store.unpin(&record.key, &record.holder)?;
            } else {
                live.insert(record.key);
            }
        }
        Ok(live)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self.store.entries()?;
        let counters = *self.counters.lock();
        let cutoff = Utc::now() - Duration::seconds(STALE_PIN_SECS);
        let mut pinned: HashSet<CacheKey> = self.pins.iter().map(|p| p.key().clone()).collect();
        pinned.extend(
            self.store
                .pins()?
                .into_iter()
                .filter(|r| r.pinned_at >= cutoff)
                .map(|r| r.key),
        );
        Ok(CacheStats {
            entries: entries.len(),
            pinned: pinned.len(),
            oldest: entries.iter().map(|e| e.created_at).min(),
            newest: entries.iter().map(|e| e.created_at).max(),
            hits: counters.hits,
            misses: counters.misses,
            writes: counters.writes,
        })
    }

    /// Evict oldest first: anything older than `max_age`, then whatever exceeds
    /// `max_entries`. Keys pinned by any holder are skipped.
    pub fn prune(&self, policy: PrunePolicy) -> Result<PruneReport, CacheError> {
        let now = Utc::now();
        let pinned = self.live_pins()?;
        let mut entries = self.store.entries()?;
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.key.cmp(&b.key))
        });

        let mut report = PruneReport::default();
        let mut remaining = entries.len();

        for entry in &entries {
            let expired = policy
                .max_age
                .is_some_and(|age| now - entry.created_at > age);
            let over = policy.max_entries.is_some_and(|max| remaining > max);
            if !expired && !over {
                continue;
            }
            if pinned.contains(&entry.key) {
                report.skipped_pinned += 1;
                continue;
            }
            if self.store.remove(&entry.key)? {
                report.removed += 1;
                remaining -= 1;
            }
        }

        report.kept = remaining;
        debug!(
            removed = report.removed,
            kept = report.kept,
            pinned = report.skipped_pinned,
            "Pruned cache"
        );
        Ok(report)
    }
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("pinned", &self.pins.len())
            .finish()
    }
}

/// Releases a pin on drop
pub struct PinGuard {
    cache: ResultCache,
    key: CacheKey,
}

impl PinGuard {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl fmt::Debug for PinGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PinGuard").field(&self.key).finish()
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.cache.release(&self.key);
    }
}

/// Pins held for the lifetime of one page run.
///
/// Clones share the same set; the pins are released when the last clone drops.
#[derive(Debug, Clone, Default)]
pub struct PinSet {
    guards: Arc<Mutex<Vec<PinGuard>>>,
}

impl PinSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self, guard: PinGuard) {
        self.guards.lock().push(guard);
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.guards.lock().iter().map(|g| g.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.guards.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("eeat-cache-test-{}", Uuid::new_v4()))
    }

    fn aged(key: &CacheKey, minutes: i64) -> CacheEntry {
        CacheEntry {
            key: key.clone(),
            payload: json!({"k": key.as_str()}),
            created_at: Utc::now() - Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = CacheKey::derive("https://a.example", "content", "v1");
        assert_eq!(a, CacheKey::derive("https://a.example", "content", "v1"));
        assert_ne!(a, CacheKey::derive("https://a.example", "content", "v2"));
        assert_ne!(a, CacheKey::derive("https://a.example", "content!", "v1"));
        assert_ne!(a, CacheKey::derive("https://b.example", "content", "v1"));
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(CacheKey::parse(a.as_str()), Some(a));
        assert_eq!(CacheKey::parse("not-a-key"), None);
    }

    #[test]
    fn test_round_trip_and_idempotent_put() {
        let cache = ResultCache::in_memory();
        let key = CacheKey::derive("u", "c", "v");

        assert_eq!(cache.get(&key).unwrap(), None);
        cache.put(&key, json!({"score": 80})).unwrap();
        cache.put(&key, json!({"score": 80})).unwrap();
        assert_eq!(cache.get(&key).unwrap(), Some(json!({"score": 80})));

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_different_payload_collides() {
        let cache = ResultCache::in_memory();
        let key = CacheKey::derive("u", "c", "v");
        cache.put(&key, json!({"score": 80})).unwrap();

        let err = cache.put(&key, json!({"score": 81})).unwrap_err();
        assert!(matches!(err, CacheError::KeyCollision { key: k } if k == key));
        assert_eq!(cache.get(&key).unwrap(), Some(json!({"score": 80})));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = temp_dir();
        let cache = ResultCache::open_dir(&dir).unwrap();
        let key = CacheKey::derive("u", "c", "v");
        cache.put(&key, json!(["a", "b"])).unwrap();
        cache.put(&key, json!(["a", "b"])).unwrap();
        assert!(matches!(
            cache.put(&key, json!(["b"])),
            Err(CacheError::KeyCollision { .. })
        ));

        let reopened = ResultCache::open_dir(&dir).unwrap();
        assert_eq!(reopened.get(&key).unwrap(), Some(json!(["a", "b"])));
        assert_eq!(reopened.stats().unwrap().entries, 1);

        // No temp files left behind
        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|d| d.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.json", key)]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_concurrent_put_if_absent_has_one_winner() {
        let dir = temp_dir();
        let store = Arc::new(FileStore::open(&dir).unwrap());
        let key = CacheKey::derive("u", "c", "v");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let key = key.clone();
                std::thread::spawn(move || {
                    store
                        .insert_if_absent(CacheEntry::new(key, json!(i)))
                        .unwrap()
                        .is_none()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_prune_by_age_skips_pinned() {
        let cache = ResultCache::in_memory();
        let old = CacheKey::derive("old", "c", "v");
        let pinned = CacheKey::derive("pinned", "c", "v");
        let fresh = CacheKey::derive("fresh", "c", "v");

        cache.store.insert_if_absent(aged(&old, 120)).unwrap();
        cache.store.insert_if_absent(aged(&pinned, 90)).unwrap();
        cache.store.insert_if_absent(aged(&fresh, 1)).unwrap();

        let guard = cache.pin(&pinned).unwrap();
        let report = cache
            .prune(PrunePolicy {
                max_age: Some(Duration::minutes(60)),
                max_entries: None,
            })
            .unwrap();

        assert_eq!(
            report,
            PruneReport {
                removed: 1,
                kept: 2,
                skipped_pinned: 1
            }
        );
        assert!(cache.get(&old).unwrap().is_none());
        assert!(cache.get(&pinned).unwrap().is_some());

        drop(guard);
        assert!(!cache.is_pinned(&pinned));
        let report = cache
            .prune(PrunePolicy {
                max_age: Some(Duration::minutes(60)),
                max_entries: None,
            })
            .unwrap();
        assert_eq!(report.removed, 1);
    }

    #[test]
    fn test_prune_by_count_removes_oldest_first() {
        let cache = ResultCache::in_memory();
        let keys: Vec<CacheKey> = (0..4)
            .map(|i| CacheKey::derive(&format!("u{}", i), "c", "v"))
            .collect();
        for (i, key) in keys.iter().enumerate() {
            // keys[0] is the oldest
            cache.store.insert_if_absent(aged(key, 10 - i as i64)).unwrap();
        }

        let report = cache
            .prune(PrunePolicy {
                max_age: None,
                max_entries: Some(2),
            })
            .unwrap();
        assert_eq!(report.removed, 2);
        assert!(cache.get(&keys[0]).unwrap().is_none());
        assert!(cache.get(&keys[1]).unwrap().is_none());
        assert!(cache.get(&keys[2]).unwrap().is_some());
        assert!(cache.get(&keys[3]).unwrap().is_some());
    }

    #[test]
    fn test_nested_pins() {
        let cache = ResultCache::in_memory();
        let key = CacheKey::derive("u", "c", "v");
        let a = cache.pin(&key).unwrap();
        let b = cache.pin(&key).unwrap();
        drop(a);
        assert!(cache.is_pinned(&key));
        drop(b);
        assert!(!cache.is_pinned(&key));
    }

    #[test]
    fn test_pins_visible_across_handles_on_same_dir() {
        let dir = temp_dir();
        let first = ResultCache::open_dir(&dir).unwrap();
        let key = CacheKey::derive("https://example.com", "c", "v");
        first.put(&key, json!({"score": 1})).unwrap();
        let guard = first.pin(&key).unwrap();

        // A second handle, as another process would open it
        let second = ResultCache::open_dir(&dir).unwrap();
        assert!(!second.is_pinned(&key));
        assert_eq!(second.stats().unwrap().pinned, 1);
        let everything = PrunePolicy {
            max_age: None,
            max_entries: Some(0),
        };
        let report = second.prune(everything).unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(report.skipped_pinned, 1);
        assert!(second.get(&key).unwrap().is_some());

        drop(guard);
        assert_eq!(second.stats().unwrap().pinned, 0);
        let report = second.prune(everything).unwrap();
        assert_eq!(report.removed, 1);
        assert!(first.get(&key).unwrap().is_none());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_abandoned_pin_is_cleared() {
        let dir = temp_dir();
        let store = FileStore::open(&dir).unwrap();
        let key = CacheKey::derive("https://example.com", "c", "v");
        store.insert_if_absent(aged(&key, 10)).unwrap();
        let abandoned = PinRecord {
            key: key.clone(),
            holder: "crashed".into(),
            pinned_at: Utc::now() - Duration::seconds(STALE_PIN_SECS + 60),
        };
        fs::write(
            store.pin_path(&key, "crashed"),
            serde_json::to_vec(&abandoned).unwrap(),
        )
        .unwrap();

        let cache = ResultCache::open_dir(&dir).unwrap();
        assert_eq!(cache.stats().unwrap().pinned, 0);
        let report = cache
            .prune(PrunePolicy {
                max_age: None,
                max_entries: Some(0),
            })
            .unwrap();
        assert_eq!(report.removed, 1);
        assert!(store.pins().unwrap().is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_pin_set_releases_on_last_drop() {
        let cache = ResultCache::in_memory();
        let key = CacheKey::derive("u", "c", "v");
        let pins = PinSet::new();
        pins.hold(cache.pin(&key).unwrap());
        pins.hold(cache.pin(&key).unwrap());
        assert_eq!(pins.len(), 2);
        assert_eq!(pins.keys(), vec![key.clone(), key.clone()]);

        let shared = pins.clone();
        drop(pins);
        assert!(cache.is_pinned(&key));
        assert_eq!(cache.store.pins().unwrap().len(), 1);
        drop(shared);
        assert!(!cache.is_pinned(&key));
        assert!(cache.store.pins().unwrap().is_empty());
    }
}
