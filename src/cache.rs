//! Caching infrastructure for performance optimization
//!
//! This module provides a TTL-based in-memory cache used to avoid repeated
//! database lookups on the hot message path (user context, file listings).
//!
//! ## Cache Types
//!
//! - **Memory Cache**: Generic TTL-based cache for fast access
//! - **Cache Manager**: Application-level caches with invalidation hooks

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::db::{StoredFile, UserContext};

/// Generic cache entry with expiration time
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value
    pub value: T,
    /// When this entry expires
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Create a new cache entry
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Check if this entry has expired
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of entries
    pub entries: usize,
    /// Number of hits
    pub hits: u64,
    /// Number of misses
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate (hits / (hits + misses))
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe in-memory cache implementation
pub struct MemoryCache<K, V> {
    data: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
    stats: Arc<RwLock<CacheStats>>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Create a new memory cache
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    /// Get a value, treating expired entries as misses
    pub fn get(&self, key: &K) -> Option<V> {
        let data = self.data.read().expect("cache lock poisoned");
        let mut stats = self.stats.write().expect("cache stats lock poisoned");

        match data.get(key) {
            Some(entry) if !entry.is_expired() => {
                stats.hits += 1;
                Some(entry.value.clone())
            }
            _ => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Insert a value with a TTL
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let mut data = self.data.write().expect("cache lock poisoned");
        data.insert(key, CacheEntry::new(value, ttl));
    }

    /// Remove a value
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut data = self.data.write().expect("cache lock poisoned");
        data.remove(key).map(|entry| entry.value)
    }

    /// Drop all expired entries
    pub fn cleanup(&self) {
        let mut data = self.data.write().expect("cache lock poisoned");
        data.retain(|_, entry| !entry.is_expired());
    }

    /// Current statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let data = self.data.read().expect("cache lock poisoned");
        let stats = self.stats.read().expect("cache stats lock poisoned");
        CacheStats {
            entries: data.len(),
            hits: stats.hits,
            misses: stats.misses,
        }
    }

    /// Number of entries including expired ones
    pub fn len(&self) -> usize {
        self.data.read().expect("cache lock poisoned").len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.data.read().expect("cache lock poisoned").is_empty()
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// TTL for cached user context entries
const USER_CONTEXT_TTL: Duration = Duration::from_secs(120);

/// TTL for cached file listings
const USER_FILES_TTL: Duration = Duration::from_secs(300);

/// Application-level caches keyed by Telegram user id
pub struct CacheManager {
    user_context: MemoryCache<i64, UserContext>,
    user_files: MemoryCache<i64, Vec<StoredFile>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self {
            user_context: MemoryCache::new(),
            user_files: MemoryCache::new(),
        }
    }

    /// Cached user context, if fresh
    pub fn get_user_context(&self, telegram_id: i64) -> Option<UserContext> {
        self.user_context.get(&telegram_id)
    }

    /// Store a user context snapshot
    pub fn put_user_context(&self, telegram_id: i64, context: UserContext) {
        self.user_context
            .insert(telegram_id, context, USER_CONTEXT_TTL);
    }

    /// Cached file listing, if fresh
    pub fn get_user_files(&self, telegram_id: i64) -> Option<Vec<StoredFile>> {
        self.user_files.get(&telegram_id)
    }

    /// Store a file listing snapshot
    pub fn put_user_files(&self, telegram_id: i64, files: Vec<StoredFile>) {
        self.user_files.insert(telegram_id, files, USER_FILES_TTL);
    }

    /// Invalidate a user's file listing (after upload or delete)
    pub fn invalidate_user_files(&self, telegram_id: i64) {
        self.user_files.remove(&telegram_id);
    }

    /// Invalidate a user's context (after an intent analysis update)
    pub fn invalidate_user_context(&self, telegram_id: i64) {
        self.user_context.remove(&telegram_id);
    }

    /// Drop expired entries from all caches
    pub fn cleanup(&self) {
        self.user_context.cleanup();
        self.user_files.cleanup();
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache: MemoryCache<String, i32> = MemoryCache::new();
        cache.insert("a".to_string(), 1, Duration::from_secs(60));

        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_expiration() {
        let cache: MemoryCache<String, i32> = MemoryCache::new();
        cache.insert("a".to_string(), 1, Duration::from_millis(0));

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.cleanup();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_tracking() {
        let cache: MemoryCache<i64, i32> = MemoryCache::new();
        cache.insert(1, 10, Duration::from_secs(60));

        cache.get(&1);
        cache.get(&2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_manager_invalidation() {
        let manager = CacheManager::new();
        manager.put_user_files(7, Vec::new());
        assert!(manager.get_user_files(7).is_some());

        manager.invalidate_user_files(7);
        assert!(manager.get_user_files(7).is_none());
    }
}
