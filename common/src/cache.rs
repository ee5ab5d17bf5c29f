//! In-memory cache of parsed analysis files, keyed by student identifier.
//!
//! Entries are shared as `Arc<Vec<CourseRecord>>` so a course list and a
//! detail lookup for the same student always index into the same array.
//! The store is bounded: once `capacity` students are cached the least
//! recently used entry is dropped, and with a TTL configured an entry older
//! than the TTL reads as absent.

use super::*;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub type CachedRecords = Arc<Vec<CourseRecord>>;

/// The only operations the rest of the system performs on cached results.
pub trait ResultCache: Send + Sync {
    fn get(&self, stuno: &str) -> Option<CachedRecords>;
    fn put(&self, stuno: &str, records: CachedRecords);
    fn invalidate(&self, stuno: &str);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct CacheEntry {
    records: CachedRecords,
    inserted: Instant,
}

/// Bounded LRU cache with an optional time-to-live.
pub struct MemoryCache {
    /// Ordered oldest-used first.
    entries: Mutex<IndexMap<String, CacheEntry>>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl MemoryCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.ttl
            .is_some_and(|ttl| entry.inserted.elapsed() > ttl)
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, stuno: &str) -> Option<CachedRecords> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let index = entries.get_index_of(stuno)?;

        if self.is_expired(&entries[index]) {
            entries.shift_remove_index(index);
            log::debug!("Cache entry for {stuno} expired");
            return None;
        }

        // mark as most recently used
        let last = entries.len() - 1;
        entries.move_index(index, last);
        Some(Arc::clone(&entries[last].records))
    }

    fn put(&self, stuno: &str, records: CachedRecords) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.shift_remove(stuno);
        entries.insert(
            stuno.to_string(),
            CacheEntry {
                records,
                inserted: Instant::now(),
            },
        );

        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                log::debug!("Evicted cache entry for {evicted}");
            }
        }
    }

    fn invalidate(&self, stuno: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.shift_remove(stuno);
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
