//! Parse result cache.
//!
//! Caches per-file parse results keyed on file identity (absolute path,
//! modification time, byte size) so unchanged files are not re-parsed on
//! every build. Entries also expire after a maximum age to bound staleness
//! in long-lived processes; file *changes* are caught by the identity key,
//! the age bound only guards against the cache outliving its usefulness.

use crate::config::CacheOptions;
use crate::types::ParseResult;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// A single cached parse result with its identity key and bookkeeping.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// File mtime at parse time, in nanoseconds since the epoch
    mtime_nanos: u128,
    /// File size at parse time, in bytes
    size: u64,
    /// When this entry was stored
    cached_at: DateTime<Utc>,
    /// How many times this entry has been served
    hit_count: u64,
    /// The stored result
    result: ParseResult,
}

/// Cache introspection counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Current number of entries
    pub entries: usize,
    /// Lifetime hit count
    pub hits: u64,
    /// Lifetime miss count
    pub misses: u64,
    /// Lifetime eviction count (explicit, stale, expired, and capacity)
    pub evictions: u64,
}

/// Content-identity-keyed store of parse results.
///
/// The map is concurrent (`DashMap`) because the parallel build path reads
/// and writes it from rayon workers. Stored results are cloned on both the
/// read and write paths: downstream consumers mutate block vectors in place
/// during incremental updates, and the cache must never share that state.
pub struct ParseCache {
    entries: DashMap<PathBuf, CacheEntry>,
    capacity: usize,
    max_age: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ParseCache {
    /// Create a new cache from configuration.
    #[must_use]
    pub fn new(options: &CacheOptions) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: options.capacity.max(1),
            max_age: Duration::seconds(options.max_age_secs as i64),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a cached result for `path`.
    ///
    /// A hit requires an exact match on (path, mtime, size) and an
    /// unexpired entry. Every other outcome — including the file no longer
    /// existing or being unreadable — is a miss, and a stale entry is
    /// silently dropped on the way out.
    pub fn get(&self, path: &Path) -> Option<ParseResult> {
        let Some(identity) = file_identity(path) else {
            // stat failure: treat as miss, drop whatever we had
            if self.entries.remove(path).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let fresh = {
            let Some(mut entry) = self.entries.get_mut(path) else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            };

            let matches = entry.mtime_nanos == identity.0 && entry.size == identity.1;
            let expired = Utc::now() - entry.cached_at > self.max_age;
            if matches && !expired {
                entry.hit_count += 1;
                Some(entry.result.clone())
            } else {
                None
            }
        };

        match fresh {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                if self.entries.remove(path).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result for `path`, keyed on the file's current identity.
    ///
    /// If the file cannot be stat'ed the result is simply not cached.
    pub fn set(&self, path: &Path, result: &ParseResult) {
        let Some((mtime_nanos, size)) = file_identity(path) else {
            return;
        };

        self.purge_expired();
        self.enforce_capacity();

        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                mtime_nanos,
                size,
                cached_at: Utc::now(),
                hit_count: 0,
                result: result.clone(),
            },
        );
    }

    /// Remove the entry for `path`. Returns whether one existed.
    pub fn evict(&self, path: &Path) -> bool {
        let removed = self.entries.remove(path).is_some();
        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let count = self.entries.len() as u64;
        self.entries.clear();
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Drop all expired entries.
    fn purge_expired(&self) {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.cached_at <= self.max_age);
        let purged = before - self.entries.len();
        if purged > 0 {
            self.evictions.fetch_add(purged as u64, Ordering::Relaxed);
            tracing::debug!(purged, "Purged expired cache entries");
        }
    }

    /// Evict oldest-by-`cached_at` entries until there is room for one
    /// insert. Access recency is not tracked; insertion age is a good
    /// enough approximation for the "many files read once per save"
    /// workload.
    fn enforce_capacity(&self) {
        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().cached_at)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }
}

/// The (mtime-nanos, size) component of the cache key. `None` when the
/// file cannot be stat'ed.
fn file_identity(path: &Path) -> Option<(u128, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta
        .modified()
        .ok()?
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_nanos();
    Some((mtime, meta.len()))
}
