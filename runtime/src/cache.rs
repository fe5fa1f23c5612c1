//! Keyed TTL cache with stale fallback.
//!
//! An entry past its TTL is stale, not gone: it stays in place until a
//! successful refresh replaces it and is served when a refresh fails.
//! Entries are swapped whole (`Arc` replace), so readers never observe a
//! partially written value while a refresh is in flight.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Advisory note attached to listings served from a stale entry.
pub const STALE_NOTE: &str = "Returned cached data due to network error";

struct CacheEntry<T> {
    value: Arc<T>,
    stored_at: Instant,
}

impl<T> CacheEntry<T> {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }
}

/// Result of a cache lookup.
#[derive(Debug)]
pub struct CacheHit<T> {
    pub value: Arc<T>,
    pub age: Duration,
    /// `age <= ttl`.
    pub fresh: bool,
}

/// Where a value returned by [`TtlCache::get_or_refresh`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    /// A fresh cached entry.
    Cache,
    /// A refresh that just succeeded.
    Upstream,
    /// A stale entry served because the refresh failed.
    StaleFallback,
}

/// A value plus its provenance.
#[derive(Debug)]
pub struct Served<T> {
    pub value: Arc<T>,
    pub from: ServedFrom,
}

impl<T> Served<T> {
    /// Whether the value came out of the cache rather than a fresh fetch.
    pub fn cached(&self) -> bool {
        self.from != ServedFrom::Upstream
    }

    /// Advisory note for the caller, set only on stale fallback.
    pub fn note(&self) -> Option<&'static str> {
        (self.from == ServedFrom::StaleFallback).then_some(STALE_NOTE)
    }
}

/// TTL cache for one family of values (e.g. video listings).
pub struct TtlCache<T> {
    name: &'static str,
    ttl: Duration,
    entries: DashMap<String, Arc<CacheEntry<T>>>,
}

impl<T> TtlCache<T> {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Look up `key`, fresh or stale.
    pub fn get(&self, key: &str) -> Option<CacheHit<T>> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<CacheHit<T>> {
        let entry = self.entries.get(key).map(|e| Arc::clone(e.value()))?;
        let age = entry.age(now);
        Some(CacheHit {
            value: Arc::clone(&entry.value),
            age,
            fresh: age <= self.ttl,
        })
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn put(&self, key: &str, value: T) -> Arc<T> {
        self.put_at(key, value, Instant::now())
    }

    /// Store `value` as if fetched at `stored_at`.
    pub fn put_at(&self, key: &str, value: T, stored_at: Instant) -> Arc<T> {
        let value = Arc::new(value);
        self.entries.insert(
            key.to_string(),
            Arc::new(CacheEntry {
                value: Arc::clone(&value),
                stored_at,
            }),
        );
        value
    }

    /// Drop every entry, fresh or stale.
    pub fn clear(&self) {
        let n = self.entries.len();
        self.entries.clear();
        tracing::info!("{} cache cleared ({n} entries)", self.name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serve a fresh entry, else run `refresh` and store its result, else fall
    /// back to a stale entry. The refresh error surfaces only when no entry
    /// exists at all.
    pub async fn get_or_refresh<F, Fut, E>(&self, key: &str, refresh: F) -> Result<Served<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if let Some(hit) = self.get(key).filter(|h| h.fresh) {
            tracing::debug!("{} cache hit for {key} (age {:?})", self.name, hit.age);
            return Ok(Served {
                value: hit.value,
                from: ServedFrom::Cache,
            });
        }

        match refresh().await {
            Ok(value) => Ok(Served {
                value: self.put(key, value),
                from: ServedFrom::Upstream,
            }),
            Err(e) => match self.stale(key) {
                Some(value) => {
                    tracing::warn!("{} refresh for {key} failed, serving stale entry: {e}", self.name);
                    Ok(Served {
                        value,
                        from: ServedFrom::StaleFallback,
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Any entry for `key`, regardless of age.
    pub fn stale(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).map(|h| h.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_freshness_boundary() {
        let cache = TtlCache::new("test", Duration::from_secs(120));
        let t0 = Instant::now();
        cache.put_at("k", vec![1, 2, 3], t0);

        let hit = cache.get_at("k", t0 + Duration::from_secs(120)).unwrap();
        assert!(hit.fresh);
        assert_eq!(*hit.value, vec![1, 2, 3]);

        let hit = cache.get_at("k", t0 + Duration::from_secs(121)).unwrap();
        assert!(!hit.fresh);
        assert_eq!(*hit.value, vec![1, 2, 3]);
    }

    #[test]
    fn test_keys_are_independent() {
        let cache = TtlCache::new("test", Duration::from_secs(1));
        cache.put("a", 1);
        assert!(cache.get("b").is_none());
        cache.put("b", 2);
        assert_eq!(*cache.get("a").unwrap().value, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_put_replaces_and_clear_empties() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        cache.put("k", "old");
        cache.put("k", "new");
        assert_eq!(*cache.get("k").unwrap().value, "new");
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("k").is_none());
    }

    #[tokio::test]
    async fn test_get_or_refresh_fresh_skips_refresh() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        cache.put("k", 7);
        let calls = AtomicUsize::new(0);

        let served = cache
            .get_or_refresh("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(8)
            })
            .await
            .unwrap();

        assert_eq!(*served.value, 7);
        assert_eq!(served.from, ServedFrom::Cache);
        assert!(served.cached());
        assert_eq!(served.note(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_or_refresh_miss_stores() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        let served = cache
            .get_or_refresh("k", || async { Ok::<_, String>(5) })
            .await
            .unwrap();
        assert_eq!(served.from, ServedFrom::Upstream);
        assert!(!served.cached());
        assert_eq!(*cache.get("k").unwrap().value, 5);
    }

    #[tokio::test]
    async fn test_get_or_refresh_stale_fallback() {
        let cache = TtlCache::new("test", Duration::from_millis(10));
        cache.put_at("k", 1, Instant::now() - Duration::from_secs(5));

        let served = cache
            .get_or_refresh("k", || async { Err::<i32, _>("upstream down".to_string()) })
            .await
            .unwrap();
        assert_eq!(*served.value, 1);
        assert_eq!(served.from, ServedFrom::StaleFallback);
        assert!(served.cached());
        assert_eq!(served.note(), Some(STALE_NOTE));
    }

    #[tokio::test]
    async fn test_get_or_refresh_stale_replaced_on_success() {
        let cache = TtlCache::new("test", Duration::from_millis(10));
        cache.put_at("k", 1, Instant::now() - Duration::from_secs(5));

        let served = cache
            .get_or_refresh("k", || async { Ok::<_, String>(2) })
            .await
            .unwrap();
        assert_eq!(*served.value, 2);
        let hit = cache.get("k").unwrap();
        assert!(hit.fresh);
        assert_eq!(*hit.value, 2);
    }

    #[tokio::test]
    async fn test_get_or_refresh_propagates_without_entry() {
        let cache: TtlCache<i32> = TtlCache::new("test", Duration::from_secs(60));
        let err = cache
            .get_or_refresh("k", || async { Err::<i32, _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(cache.get("k").is_none());
    }
}
