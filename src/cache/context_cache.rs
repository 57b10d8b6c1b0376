use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::fingerprint::{fingerprint, is_valid_hash};
use super::CacheError;
use crate::clock::Clock;
use crate::fs::{read_optional, with_exclusive_lock, write_json_atomic};

const INDEX_FILE: &str = "index.json";
const INDEX_LOCK: &str = "index.lock";
const ENTRIES_DIR: &str = "entries";

/// Stored payload for one fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: String,
    pub path: PathBuf,
    pub payload: Value,
    pub cached_at: DateTime<Utc>,
}

/// Index metadata, kept separately so listing never reads payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub fingerprint: String,
    pub path: PathBuf,
    pub cached_at: DateTime<Utc>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheLookup {
    pub fingerprint: String,
    pub status: CacheStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

type Index = BTreeMap<String, IndexEntry>;

pub struct ContextCache {
    dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ContextCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Payload for the tree's current fingerprint, `None` if absent or expired.
    pub fn get(&self, path: &Path) -> Result<Option<Value>, CacheError> {
        let fp = fingerprint(path)?;
        self.get_by_fingerprint(&fp.hash)
    }

    pub fn get_by_fingerprint(&self, hash: &str) -> Result<Option<Value>, CacheError> {
        let (status, entry) = self.lookup(hash)?;
        match status {
            CacheStatus::Hit => Ok(entry.map(|e| e.payload)),
            CacheStatus::Expired => {
                debug!(fingerprint = %hash, "Cache entry expired");
                Ok(None)
            }
            CacheStatus::Miss => {
                debug!(fingerprint = %hash, "Cache miss");
                Ok(None)
            }
        }
    }

    pub fn check(&self, path: &Path) -> Result<CacheLookup, CacheError> {
        let fp = fingerprint(path)?;
        let (status, entry) = self.lookup(&fp.hash)?;
        Ok(CacheLookup {
            fingerprint: fp.hash,
            status,
            cached_at: entry.map(|e| e.cached_at),
        })
    }

    /// Store `payload` under the tree's current fingerprint, replacing any
    /// earlier entry for it.
    pub fn store(&self, path: &Path, payload: Value) -> Result<CacheEntry, CacheError> {
        let fp = fingerprint(path)?;
        let entry = CacheEntry {
            fingerprint: fp.hash.clone(),
            path: fp.canonical_path,
            payload,
            cached_at: self.clock.now(),
        };

        let entry_path = self.entry_path(&entry.fingerprint);
        let serialized = serde_json::to_vec_pretty(&entry)?;
        crate::fs::write_atomic(&entry_path, &serialized).map_err(|e| CacheError::io(&entry_path, e))?;

        self.update_index(|index| {
            index.insert(
                entry.fingerprint.clone(),
                IndexEntry {
                    fingerprint: entry.fingerprint.clone(),
                    path: entry.path.clone(),
                    cached_at: entry.cached_at,
                    size_bytes: serialized.len() as u64,
                },
            );
        })?;

        info!(fingerprint = %entry.fingerprint, path = ?entry.path, files = fp.files, "Context cached");
        Ok(entry)
    }

    /// Drop every entry recorded for the tree at `path`, whatever its fingerprint.
    pub fn invalidate(&self, path: &Path) -> Result<usize, CacheError> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let removed = self.remove_where(|entry| entry.path == canonical)?;
        info!(path = ?canonical, removed, "Cache invalidated");
        Ok(removed)
    }

    /// Remove entries cached more than `older_than` ago.
    pub fn clean(&self, older_than: Duration) -> Result<usize, CacheError> {
        // A window reaching past the earliest representable instant covers nothing.
        let Some(cutoff) = self.clock.now().checked_sub_signed(older_than) else {
            return Ok(0);
        };
        let removed = self.remove_where(|entry| entry.cached_at < cutoff)?;
        if removed > 0 {
            info!(removed, "Cleaned old cache entries");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let index = self.read_index()?;
        Ok(index.values().fold(CacheStats::default(), |mut stats, entry| {
            stats.entries += 1;
            stats.total_bytes += entry.size_bytes;
            stats.oldest = Some(stats.oldest.map_or(entry.cached_at, |t| t.min(entry.cached_at)));
            stats.newest = Some(stats.newest.map_or(entry.cached_at, |t| t.max(entry.cached_at)));
            stats
        }))
    }

    /// Index entries, newest first.
    pub fn list(&self) -> Result<Vec<IndexEntry>, CacheError> {
        let mut entries: Vec<IndexEntry> = self.read_index()?.into_values().collect();
        entries.sort_by(|a, b| b.cached_at.cmp(&a.cached_at));
        Ok(entries)
    }

    fn lookup(&self, hash: &str) -> Result<(CacheStatus, Option<CacheEntry>), CacheError> {
        if !is_valid_hash(hash) {
            return Err(CacheError::InvalidFingerprint(hash.to_string()));
        }
        let path = self.entry_path(hash);
        let Some(contents) = read_optional(&path).map_err(|e| CacheError::io(&path, e))? else {
            return Ok((CacheStatus::Miss, None));
        };
        let entry: CacheEntry = match serde_json::from_str(&contents) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(file = ?path, error = %e, "Unreadable cache entry, treating as miss");
                return Ok((CacheStatus::Miss, None));
            }
        };

        if self.clock.now() - entry.cached_at > self.ttl {
            Ok((CacheStatus::Expired, Some(entry)))
        } else {
            Ok((CacheStatus::Hit, Some(entry)))
        }
    }

    fn remove_where(&self, mut doomed: impl FnMut(&IndexEntry) -> bool) -> Result<usize, CacheError> {
        let mut removed = Vec::new();
        self.update_index(|index| {
            index.retain(|_, entry| {
                if doomed(entry) {
                    removed.push(entry.fingerprint.clone());
                    false
                } else {
                    true
                }
            });
        })?;

        for hash in &removed {
            let path = self.entry_path(hash);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(file = ?path, error = %e, "Failed to remove cache entry");
                }
            }
        }
        Ok(removed.len())
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(ENTRIES_DIR).join(format!("{hash}.json"))
    }

    fn read_index(&self) -> Result<Index, CacheError> {
        let path = self.dir.join(INDEX_FILE);
        let Some(contents) = read_optional(&path).map_err(|e| CacheError::io(&path, e))? else {
            return Ok(Index::new());
        };
        match serde_json::from_str(&contents) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!(file = ?path, error = %e, "Cache index unreadable, starting a new one");
                Ok(Index::new())
            }
        }
    }

    fn update_index(&self, f: impl FnOnce(&mut Index)) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        with_exclusive_lock(&self.dir.join(INDEX_LOCK), || {
            let mut index = self.read_index()?;
            f(&mut index);
            let path = self.dir.join(INDEX_FILE);
            write_json_atomic(&path, &index).map_err(|e| CacheError::io(&path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;

    fn cache(dir: &TempDir, clock: Arc<ManualClock>) -> ContextCache {
        ContextCache::new(dir.path().join("cache"), Duration::days(7), clock)
    }

    #[test]
    fn store_then_get_returns_payload_until_ttl() {
        let root = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&root, clock.clone());

        cache.store(project.path(), json!({"summary": "three crates"})).unwrap();
        assert_eq!(
            cache.get(project.path()).unwrap(),
            Some(json!({"summary": "three crates"}))
        );
        assert_eq!(cache.check(project.path()).unwrap().status, CacheStatus::Hit);

        clock.advance(Duration::days(8));
        assert_eq!(cache.get(project.path()).unwrap(), None);
        assert_eq!(cache.check(project.path()).unwrap().status, CacheStatus::Expired);
    }

    #[test]
    fn clean_with_an_enormous_window_removes_nothing() {
        let root = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&root, clock.clone());
        cache.store(project.path(), json!("kept")).unwrap();
        clock.advance(Duration::days(365));

        assert_eq!(cache.clean(Duration::days(100_000_000)).unwrap(), 0);
        assert_eq!(cache.clean(Duration::MAX).unwrap(), 0);
        assert_eq!(cache.stats().unwrap().entries, 1);
        assert_eq!(cache.clean(Duration::days(30)).unwrap(), 1);
    }

    #[test]
    fn store_overwrites_same_fingerprint() {
        let root = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let cache = cache(&root, Arc::new(ManualClock::default()));

        cache.store(project.path(), json!(1)).unwrap();
        cache.store(project.path(), json!(2)).unwrap();
        assert_eq!(cache.get(project.path()).unwrap(), Some(json!(2)));
        assert_eq!(cache.stats().unwrap().entries, 1);
    }

    #[test]
    fn invalidate_removes_every_fingerprint_for_the_path() {
        let root = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let cache = cache(&root, Arc::new(ManualClock::default()));

        cache.store(project.path(), json!("old")).unwrap();
        std::fs::write(project.path().join("new.txt"), "").unwrap();
        cache.store(project.path(), json!("new")).unwrap();
        cache.store(other.path(), json!("keep")).unwrap();
        assert_eq!(cache.list().unwrap().len(), 3);

        assert_eq!(cache.invalidate(project.path()).unwrap(), 2);
        assert_eq!(cache.list().unwrap().len(), 1);
        assert_eq!(cache.get(other.path()).unwrap(), Some(json!("keep")));
    }

    #[test]
    fn clean_removes_only_old_entries_and_stats_follow() {
        let root = TempDir::new().unwrap();
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&root, clock.clone());

        cache.store(a.path(), json!("a")).unwrap();
        clock.advance(Duration::days(40));
        cache.store(b.path(), json!("b")).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.oldest < stats.newest);

        assert_eq!(cache.clean(Duration::days(30)).unwrap(), 1);
        assert_eq!(cache.stats().unwrap().entries, 1);
        assert!(cache.get(b.path()).unwrap().is_some());
    }

    #[test]
    fn bogus_fingerprint_is_rejected() {
        let root = TempDir::new().unwrap();
        let cache = cache(&root, Arc::new(ManualClock::default()));
        assert!(matches!(
            cache.get_by_fingerprint("../../etc/passwd"),
            Err(CacheError::InvalidFingerprint(_))
        ));
    }
}
