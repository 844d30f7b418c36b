//! In-memory feed cache with a fixed time-to-live.
//!
//! Entries are keyed by the exact feed URL string and replaced wholesale on
//! refresh. Stale entries are not purged; they are only overwritten when the
//! same URL is fetched again. Without a capacity bound the map therefore grows
//! with every distinct URL ever requested for the life of the process, which
//! matters for long-running deployments. Setting a capacity turns the map into
//! an LRU that evicts the least recently used URL instead.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::types::ParsedFeed;

/// Default freshness window (1 hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// A parsed feed together with the instant it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fetched_at: Instant,
    pub feed: Arc<ParsedFeed>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current instant.
    pub fn new(feed: Arc<ParsedFeed>) -> Self {
        Self {
            fetched_at: Instant::now(),
            feed,
        }
    }

    /// An entry is fresh while strictly less than `ttl` has elapsed.
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// Thread-safe feed cache shared across requests.
///
/// The lock is only held for map operations, never across an await point.
pub struct FeedCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl FeedCache {
    /// Creates an unbounded cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            ttl,
        }
    }

    /// Creates a cache holding at most `capacity` URLs. `0` means unbounded.
    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        let entries = match NonZeroUsize::new(capacity) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            entries: Mutex::new(entries),
            ttl,
        }
    }

    /// Returns the entry for `url` regardless of age.
    pub fn get(&self, url: &str) -> Option<CacheEntry> {
        self.lock().get(url).cloned()
    }

    /// Returns the cached feed for `url` if it is still fresh right now.
    pub fn get_fresh(&self, url: &str) -> Option<Arc<ParsedFeed>> {
        let now = Instant::now();
        self.lock()
            .get(url)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .map(|entry| Arc::clone(&entry.feed))
    }

    /// Stores `entry` for `url`, replacing any previous entry.
    ///
    /// An entry older than the one already stored is discarded so that a
    /// slow fetch finishing late can never roll the cache back.
    pub fn put(&self, url: &str, entry: CacheEntry) {
        let mut entries = self.lock();
        if let Some(existing) = entries.peek(url) {
            if existing.fetched_at > entry.fetched_at {
                tracing::debug!(url = %url, "Discarding stale cache write");
                return;
            }
        }
        if let Some((evicted, _)) = entries.push(url.to_string(), entry) {
            if evicted != url {
                tracing::debug!(url = %evicted, "Evicted least recently used feed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        // Entries are replaced atomically, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(title: &str) -> Arc<ParsedFeed> {
        Arc::new(ParsedFeed {
            title: Some(title.to_string()),
            entries: Vec::new(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_within_ttl() {
        let cache = FeedCache::default();
        cache.put("https://a.example.com/rss", CacheEntry::new(feed("A")));

        tokio::time::advance(Duration::from_secs(3599)).await;
        let hit = cache.get_fresh("https://a.example.com/rss");
        assert_eq!(hit.unwrap().title.as_deref(), Some("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_at_exactly_ttl() {
        let cache = FeedCache::default();
        cache.put("https://a.example.com/rss", CacheEntry::new(feed("A")));

        tokio::time::advance(DEFAULT_TTL).await;
        assert!(cache.get_fresh("https://a.example.com/rss").is_none());
        // Stale entries are kept until overwritten
        assert!(cache.get("https://a.example.com/rss").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_replaces_with_newer_entry() {
        let cache = FeedCache::default();
        let url = "https://a.example.com/rss";
        cache.put(url, CacheEntry::new(feed("old")));
        let first = cache.get(url).unwrap().fetched_at;

        tokio::time::advance(Duration::from_secs(4000)).await;
        cache.put(url, CacheEntry::new(feed("new")));

        let entry = cache.get(url).unwrap();
        assert!(entry.fetched_at > first);
        assert_eq!(entry.feed.title.as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_ignores_older_entry() {
        let cache = FeedCache::default();
        let url = "https://a.example.com/rss";
        let older = CacheEntry::new(feed("older"));

        tokio::time::advance(Duration::from_secs(10)).await;
        cache.put(url, CacheEntry::new(feed("newer")));
        cache.put(url, older);

        assert_eq!(cache.get(url).unwrap().feed.title.as_deref(), Some("newer"));
    }

    #[test]
    fn test_keys_are_exact_strings() {
        let cache = FeedCache::default();
        cache.put("https://a.example.com/rss", CacheEntry::new(feed("A")));
        assert!(cache.get_fresh("https://a.example.com/rss/").is_none());
        assert!(cache.get_fresh("HTTPS://a.example.com/rss").is_none());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = FeedCache::with_capacity(DEFAULT_TTL, 2);
        cache.put("a", CacheEntry::new(feed("A")));
        cache.put("b", CacheEntry::new(feed("B")));
        // Touch "a" so "b" becomes least recently used
        assert!(cache.get_fresh("a").is_some());
        cache.put("c", CacheEntry::new(feed("C")));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let cache = FeedCache::with_capacity(DEFAULT_TTL, 0);
        for i in 0..100 {
            cache.put(&format!("https://{i}.example.com/rss"), CacheEntry::new(feed("x")));
        }
        assert_eq!(cache.len(), 100);
    }
}
