//! Bounded time-to-live cache.

use std::{
    borrow::Borrow,
    fmt,
    hash::Hash,
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use lru::LruCache;
use parking_lot::Mutex;

use crate::Clock;

/// A value and the instant it stops being served.
type Slot<V> = (V, Instant);

/// An LRU map whose entries also expire after a fixed lifetime.
///
/// When full, expired entries go first, then the least recently used one. Safe to share
/// between tasks.
pub struct TtlCache<K: Hash + Eq, V> {
    /// Time source for expiry.
    clock: Arc<dyn Clock>,
    /// Lifetime of an entry.
    ttl: Duration,
    /// Guarded storage.
    entries: Mutex<LruCache<K, Slot<V>>>,
}

impl<K: Hash + Eq, V> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .finish()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Creates an empty cache holding at most `capacity` entries (at least one).
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            clock,
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns a live entry and marks it recently used. An expired entry is dropped.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires)) if *expires > now => Some(value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Inserts or refreshes an entry.
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        if !entries.contains(&key) && entries.len() >= entries.cap().get() {
            let expired = entries
                .iter()
                .rev()
                .find(|(_, (_, expires))| *expires <= now)
                .map(|(k, _)| k.clone());
            if let Some(expired) = expired {
                entries.pop(&expired);
            }
        }
        entries.put(key, (value, now + self.ttl));
    }

    /// Drops an entry.
    pub fn remove<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.lock().pop(key);
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    /// A cache over a manual clock with a one-minute lifetime.
    fn cache(capacity: usize) -> (Arc<ManualClock>, TtlCache<String, u64>) {
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::new(clock.clone(), Duration::from_secs(60), capacity);
        (clock, cache)
    }

    #[test]
    fn entries_expire() {
        let (clock, cache) = cache(10);
        cache.insert("wolf".into(), 3);
        assert_eq!(cache.get("wolf"), Some(3));
        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get("wolf"), Some(3));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("wolf"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn reinsert_refreshes_lifetime() {
        let (clock, cache) = cache(10);
        cache.insert("fox".into(), 1);
        clock.advance(Duration::from_secs(45));
        cache.insert("fox".into(), 2);
        clock.advance(Duration::from_secs(45));
        assert_eq!(cache.get("fox"), Some(2));
    }

    #[test]
    fn least_recently_used_is_evicted_at_capacity() {
        let (_clock, cache) = cache(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c".into(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn refreshed_entry_survives_eviction() {
        let (clock, cache) = cache(2);
        cache.insert("a".into(), 1);
        clock.advance(Duration::from_secs(61));
        assert_eq!(cache.get("a"), None);
        cache.insert("b".into(), 2);
        cache.insert("a".into(), 3);
        cache.insert("c".into(), 4);
        assert_eq!(cache.get("a"), Some(3));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(4));
    }

    #[test]
    fn expired_entries_are_evicted_before_live_ones() {
        let (clock, cache) = cache(2);
        cache.insert("old".into(), 1);
        clock.advance(Duration::from_secs(30));
        cache.insert("new".into(), 2);
        assert_eq!(cache.get("old"), Some(1));
        clock.advance(Duration::from_secs(31));
        cache.insert("next".into(), 3);
        assert_eq!(cache.get("new"), Some(2));
        assert_eq!(cache.get("next"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn churn_stays_within_capacity() {
        let (_clock, cache) = cache(10);
        for i in 0..10_000u64 {
            let key = format!("tag_{}", i % 37);
            cache.insert(key.clone(), i);
            if i % 3 == 0 {
                cache.remove(&key);
            }
            assert!(cache.len() <= 10);
        }
        cache.remove("tag_0");
        for i in 0..10 {
            cache.insert(format!("fresh_{i}"), i);
        }
        assert_eq!(cache.len(), 10);
        assert!((0..10).all(|i| cache.get(&format!("fresh_{i}")) == Some(i)));
    }

    #[test]
    fn remove_drops_entry() {
        let (_clock, cache) = cache(2);
        cache.insert("a".into(), 1);
        cache.remove("a");
        assert_eq!(cache.get("a"), None);
    }
}
