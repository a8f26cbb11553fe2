//! Bounded cache of decoded raster tiles.
//!
//! Eviction is first-in first-out: when the cache is full, the entry that
//! was inserted longest ago is dropped, regardless of how recently it was
//! read. Reads never reorder entries.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::coord::CanonicalTileId;
use crate::decode::Bitmap;

/// Key of one decoded tile: archive URL plus tile address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub url: String,
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCacheKey {
    pub fn new(url: impl Into<String>, tile: CanonicalTileId) -> Self {
        Self {
            url: url.into(),
            z: tile.z,
            x: tile.x,
            y: tile.y,
        }
    }
}

impl fmt::Display for TileCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.url, self.z, self.x, self.y)
    }
}

/// Insertion-ordered tile cache holding at most `capacity` bitmaps.
///
/// Backed by an [`LruCache`] that is only ever read with `peek`, so its
/// recency order is the insertion order.
pub struct FifoTileCache {
    entries: Mutex<LruCache<TileCacheKey, Bitmap>>,
}

impl FifoTileCache {
    /// Creates an empty cache. `capacity` is raised to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached bitmap without changing eviction order.
    pub fn get(&self, key: &TileCacheKey) -> Option<Bitmap> {
        self.entries.lock().peek(key).cloned()
    }

    pub fn contains(&self, key: &TileCacheKey) -> bool {
        self.entries.lock().contains(key)
    }

    /// Stores a bitmap and returns the key evicted to make room, if any.
    ///
    /// Replacing an existing key keeps its original insertion slot and
    /// evicts nothing.
    pub fn put(&self, key: TileCacheKey, bitmap: Bitmap) -> Option<TileCacheKey> {
        let mut entries = self.entries.lock();

        if let Some(slot) = entries.peek_mut(&key) {
            *slot = bitmap;
            return None;
        }
        entries.push(key, bitmap).map(|(evicted, _)| evicted)
    }

    /// Removes every entry for `url`; returns how many were dropped.
    pub fn remove_url(&self, url: &str) -> usize {
        let mut entries = self.entries.lock();
        let doomed: Vec<TileCacheKey> = entries
            .iter()
            .filter(|(k, _)| k.url == url)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    /// Keys in eviction order, oldest first.
    pub fn keys(&self) -> Vec<TileCacheKey> {
        self.entries.lock().iter().rev().map(|(k, _)| k.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::blank_bitmap;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    fn key(url: &str, x: u32) -> TileCacheKey {
        TileCacheKey::new(url, CanonicalTileId::new(3, x, 0))
    }

    #[test]
    fn test_fifo_not_lru() {
        let cache = FifoTileCache::new(2);
        let (a, b, c, d) = (key("u", 0), key("u", 1), key("u", 2), key("u", 3));

        assert_eq!(cache.put(a.clone(), blank_bitmap(1)), None);
        assert_eq!(cache.put(b.clone(), blank_bitmap(1)), None);
        assert_eq!(cache.put(c.clone(), blank_bitmap(1)), Some(a.clone()));
        assert_eq!(cache.keys(), vec![b.clone(), c.clone()]);

        // Reading B does not protect it.
        assert!(cache.get(&b).is_some());
        assert_eq!(cache.put(d.clone(), blank_bitmap(1)), Some(b.clone()));
        assert_eq!(cache.keys(), vec![c, d]);
        assert!(cache.get(&a).is_none());
    }

    #[test]
    fn test_replace_keeps_slot() {
        let cache = FifoTileCache::new(2);
        cache.put(key("u", 0), blank_bitmap(1));
        cache.put(key("u", 1), blank_bitmap(1));

        assert_eq!(cache.put(key("u", 0), blank_bitmap(2)), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("u", 0)).unwrap().width(), 2);
        assert_eq!(cache.keys()[0], key("u", 0));
    }

    #[test]
    fn test_urls_are_distinct_keys() {
        let cache = FifoTileCache::new(10);
        cache.put(key("a", 0), blank_bitmap(1));
        cache.put(key("a/", 0), blank_bitmap(1));
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.remove_url("a"), 1);
        assert!(cache.contains(&key("a/", 0)));
        assert_eq!(cache.keys(), vec![key("a/", 0)]);
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let cache = FifoTileCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(key("u", 0), blank_bitmap(1));
        cache.put(key("u", 1), blank_bitmap(1));
        assert_eq!(cache.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_bound_and_fifo_order(
            capacity in 1usize..8,
            inserts in proptest::collection::vec(0u32..16, 0..64),
        ) {
            let cache = FifoTileCache::new(capacity);
            let mut model: VecDeque<u32> = VecDeque::new();

            for x in inserts {
                let evicted = cache.put(key("u", x), blank_bitmap(1));
                let expected = if model.contains(&x) {
                    None
                } else {
                    let out = if model.len() >= capacity { model.pop_front() } else { None };
                    model.push_back(x);
                    out
                };
                prop_assert_eq!(evicted, expected.map(|x| key("u", x)));
                prop_assert!(cache.len() <= capacity);
            }

            let keys: Vec<_> = model.iter().map(|x| key("u", *x)).collect();
            prop_assert_eq!(cache.keys(), keys);
        }
    }
}
