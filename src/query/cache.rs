use lru::LruCache;
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::search::results::{SearchResults, SortBy};

/// Query result cache; entries are keyed by snapshot version so a commit never serves stale pages
pub struct QueryCache {
    cache: Option<Mutex<LruCache<QueryKey, SearchResults>>>,
    capacity: usize,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct QueryKey {
    pub version: u64,
    pub query: String,  // Debug form of the parsed query
    pub limit: usize,
    pub offset: usize,
    pub sort: SortBy,
}

impl QueryCache {
    /// A capacity of 0 disables caching
    pub fn new(capacity: usize) -> Self {
        QueryCache {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            capacity,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<SearchResults> {
        let cache = self.cache.as_ref()?;
        match cache.lock().get(key) {
            Some(results) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Some(results.clone())
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: QueryKey, results: SearchResults) {
        if let Some(cache) = &self.cache {
            cache.lock().put(key, results);
        }
    }

    /// Drop entries of snapshots older than `version`
    pub fn evict_before(&self, version: u64) {
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock();
            let stale: Vec<QueryKey> = cache.iter()
                .filter(|(key, _)| key.version < version)
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                cache.pop(&key);
            }
        }
    }

    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.cache.as_ref().map(|c| c.lock().len()).unwrap_or(0),
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
