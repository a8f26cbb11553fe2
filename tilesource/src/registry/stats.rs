//! Registry counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of registry activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Decoded tile cache lookups that found a bitmap.
    pub tile_hits: u64,
    /// Decoded tile cache lookups that found nothing.
    pub tile_misses: u64,
    pub tile_insertions: u64,
    pub tile_evictions: u64,
    /// Metadata lookups served from cache.
    pub metadata_hits: u64,
    /// Metadata values stored after a fetch.
    pub metadata_fetches: u64,
    /// Distinct archive connections created.
    pub connections_opened: u64,
}

impl RegistryStats {
    /// Tile cache hit rate in `[0, 1]`; zero when nothing was looked up.
    pub fn tile_hit_rate(&self) -> f64 {
        let total = self.tile_hits + self.tile_misses;
        if total == 0 {
            0.0
        } else {
            self.tile_hits as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`RegistryStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub tile_hits: AtomicU64,
    pub tile_misses: AtomicU64,
    pub tile_insertions: AtomicU64,
    pub tile_evictions: AtomicU64,
    pub metadata_hits: AtomicU64,
    pub metadata_fetches: AtomicU64,
    pub connections_opened: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RegistryStats {
        RegistryStats {
            tile_hits: self.tile_hits.load(Ordering::Relaxed),
            tile_misses: self.tile_misses.load(Ordering::Relaxed),
            tile_insertions: self.tile_insertions.load(Ordering::Relaxed),
            tile_evictions: self.tile_evictions.load(Ordering::Relaxed),
            metadata_hits: self.metadata_hits.load(Ordering::Relaxed),
            metadata_fetches: self.metadata_fetches.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
        }
    }
}
