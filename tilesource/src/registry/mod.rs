//! Process-wide resources shared by every tile source.
//!
//! The registry owns four things, all keyed by the archive URL exactly as
//! given (no normalization):
//!
//! - one archive connection per URL
//! - the parsed header and metadata document per URL
//! - a bounded FIFO cache of decoded raster tiles
//! - the vector tile worker pool, created by the first vector source
//!
//! Entries are created lazily and outlive the sources that created them,
//! so a second layer on the same archive reuses them. Nothing is evicted
//! when a source is dropped; hosts that know an archive is no longer used
//! call [`SharedResourceRegistry::evict_archive`].

mod stats;
mod tile_cache;

pub use stats::RegistryStats;
pub use tile_cache::{FifoTileCache, TileCacheKey};

use std::future::Future;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use moka::future::Cache;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::archive::{
    ArchiveError, ArchiveHeader, ArchiveOpener, ArchiveReader, FileArchiveOpener,
};
use crate::config::RegistryConfig;
use crate::coord::CanonicalTileId;
use crate::decode::Bitmap;
use crate::error::SourceError;
use crate::worker::{VectorTileParser, WorkerHandle, WorkerPool};
use stats::StatsCounters;

static GLOBAL: OnceLock<Arc<SharedResourceRegistry>> = OnceLock::new();

/// One open archive, shared by every source with the same URL.
pub struct ArchiveConnection {
    url: String,
    archive: Arc<dyn ArchiveReader>,
}

impl ArchiveConnection {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn archive(&self) -> &Arc<dyn ArchiveReader> {
        &self.archive
    }
}

/// Which metadata value is cached for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Header,
    Metadata,
}

/// A cached metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Header(ArchiveHeader),
    Metadata(Arc<serde_json::Value>),
}

type MetadataKey = (String, MetadataKind);

/// Shared caches and worker pool.
pub struct SharedResourceRegistry {
    config: RegistryConfig,
    opener: Arc<dyn ArchiveOpener>,
    connections: DashMap<String, Arc<ArchiveConnection>>,
    metadata: Cache<MetadataKey, MetadataValue>,
    tiles: FifoTileCache,
    workers: Mutex<Option<Arc<WorkerPool>>>,
    stats: StatsCounters,
}

impl SharedResourceRegistry {
    /// Creates a registry that opens archives through `opener`.
    pub fn new(config: RegistryConfig, opener: Arc<dyn ArchiveOpener>) -> Self {
        Self {
            tiles: FifoTileCache::new(config.tile_cache_capacity),
            config,
            opener,
            connections: DashMap::new(),
            // Unbounded, no expiry: metadata is never revalidated.
            metadata: Cache::builder().build(),
            workers: Mutex::new(None),
            stats: StatsCounters::default(),
        }
    }

    /// The process-wide registry, built on first use with default
    /// configuration and local file archives.
    pub fn global() -> Arc<SharedResourceRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| {
            Arc::new(Self::new(
                RegistryConfig::default(),
                Arc::new(FileArchiveOpener),
            ))
        }))
    }

    /// Builds the process-wide registry with `config`.
    ///
    /// Returns false if it already existed; the existing registry is kept.
    pub fn init_global(config: RegistryConfig) -> bool {
        let mut installed = false;
        GLOBAL.get_or_init(|| {
            installed = true;
            Arc::new(Self::new(config, Arc::new(FileArchiveOpener)))
        });
        installed
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the connection for `url`, opening it on first use.
    ///
    /// Concurrent callers with the same URL always receive the same
    /// connection.
    pub fn get_connection(&self, url: &str) -> Arc<ArchiveConnection> {
        if let Some(existing) = self.connections.get(url) {
            return Arc::clone(existing.value());
        }

        let entry = self.connections.entry(url.to_string()).or_insert_with(|| {
            StatsCounters::incr(&self.stats.connections_opened);
            debug!(url, "Opening archive connection");
            Arc::new(ArchiveConnection {
                url: url.to_string(),
                archive: self.opener.open(url),
            })
        });
        Arc::clone(entry.value())
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub async fn get_cached_metadata(&self, url: &str, kind: MetadataKind) -> Option<MetadataValue> {
        let value = self.metadata.get(&(url.to_string(), kind)).await;
        if value.is_some() {
            StatsCounters::incr(&self.stats.metadata_hits);
        }
        value
    }

    pub async fn put_cached_metadata(&self, url: &str, kind: MetadataKind, value: MetadataValue) {
        StatsCounters::incr(&self.stats.metadata_fetches);
        self.metadata.insert((url.to_string(), kind), value).await;
    }

    /// Returns the cached value for (`url`, `kind`), running `fetch` on a miss.
    ///
    /// Concurrent callers for the same key share one `fetch`; the others
    /// wait for its result. Failures are not cached.
    pub async fn get_or_fetch_metadata<F>(
        &self,
        url: &str,
        kind: MetadataKind,
        fetch: F,
    ) -> Result<MetadataValue, ArchiveError>
    where
        F: Future<Output = Result<MetadataValue, ArchiveError>>,
    {
        let entry = self
            .metadata
            .entry((url.to_string(), kind))
            .or_try_insert_with(async {
                StatsCounters::incr(&self.stats.metadata_fetches);
                fetch.await
            })
            .await
            .map_err(|e| (*e).clone())?;

        if !entry.is_fresh() {
            StatsCounters::incr(&self.stats.metadata_hits);
        }
        Ok(entry.into_value())
    }

    /// Header for `url`, read through `archive` at most once.
    pub async fn header_or_fetch(
        &self,
        url: &str,
        archive: &dyn ArchiveReader,
    ) -> Result<ArchiveHeader, ArchiveError> {
        let value = self
            .get_or_fetch_metadata(url, MetadataKind::Header, async {
                archive.get_header().await.map(MetadataValue::Header)
            })
            .await?;
        match value {
            MetadataValue::Header(header) => Ok(header),
            MetadataValue::Metadata(_) => Err(kind_mismatch(url, MetadataKind::Header)),
        }
    }

    /// Metadata document for `url`, read through `archive` at most once.
    pub async fn metadata_or_fetch(
        &self,
        url: &str,
        archive: &dyn ArchiveReader,
    ) -> Result<Arc<serde_json::Value>, ArchiveError> {
        let value = self
            .get_or_fetch_metadata(url, MetadataKind::Metadata, async {
                archive
                    .get_metadata()
                    .await
                    .map(|doc| MetadataValue::Metadata(Arc::new(doc)))
            })
            .await?;
        match value {
            MetadataValue::Metadata(doc) => Ok(doc),
            MetadataValue::Header(_) => Err(kind_mismatch(url, MetadataKind::Metadata)),
        }
    }

    /// Cached header for `url`, if present.
    pub async fn cached_header(&self, url: &str) -> Option<ArchiveHeader> {
        match self.get_cached_metadata(url, MetadataKind::Header).await {
            Some(MetadataValue::Header(header)) => Some(header),
            _ => None,
        }
    }

    /// Cached metadata document for `url`, if present.
    pub async fn cached_metadata_document(&self, url: &str) -> Option<Arc<serde_json::Value>> {
        match self.get_cached_metadata(url, MetadataKind::Metadata).await {
            Some(MetadataValue::Metadata(doc)) => Some(doc),
            _ => None,
        }
    }

    /// Decoded tile for (`url`, `tile`), if cached.
    pub fn get_tile(&self, url: &str, tile: CanonicalTileId) -> Option<Bitmap> {
        let found = self.tiles.get(&TileCacheKey::new(url, tile));
        match found {
            Some(_) => StatsCounters::incr(&self.stats.tile_hits),
            None => StatsCounters::incr(&self.stats.tile_misses),
        }
        found
    }

    /// Caches a decoded tile, evicting the oldest insertion when full.
    pub fn put_tile(&self, key: TileCacheKey, bitmap: Bitmap) {
        StatsCounters::incr(&self.stats.tile_insertions);
        if let Some(evicted) = self.tiles.put(key, bitmap) {
            StatsCounters::incr(&self.stats.tile_evictions);
            debug!(key = %evicted, "Evicted decoded tile");
        }
    }

    pub fn tile_cache(&self) -> &FifoTileCache {
        &self.tiles
    }

    /// Returns the worker pool, starting it with `parser` if no pool exists.
    ///
    /// Only the first caller's parser is used; later callers share the pool.
    pub fn ensure_worker_pool(
        &self,
        parser: Arc<dyn VectorTileParser>,
    ) -> Result<Arc<WorkerPool>, SourceError> {
        let mut slot = self.workers.lock();
        if let Some(pool) = slot.as_ref() {
            return Ok(Arc::clone(pool));
        }

        let pool = WorkerPool::new(self.config.worker_pool_size, parser)
            .map(Arc::new)
            .map_err(|e| SourceError::WorkerPool(e.to_string()))?;
        info!(size = pool.len(), "Started vector tile worker pool");
        *slot = Some(Arc::clone(&pool));
        Ok(pool)
    }

    /// The worker pool, if a vector source has started it.
    pub fn worker_pool(&self) -> Option<Arc<WorkerPool>> {
        self.workers.lock().clone()
    }

    /// Next worker in round-robin order, or `None` before the pool exists.
    pub fn next_worker(&self) -> Option<Arc<WorkerHandle>> {
        self.worker_pool().map(|pool| pool.next_worker())
    }

    /// Number of tiles along one axis at zoom `z`.
    pub fn world_size(&self, z: u8) -> f64 {
        crate::coord::world_size(z)
    }

    /// Drops the connection, metadata and decoded tiles for `url`.
    ///
    /// Sources still holding the connection keep working; the next source
    /// for `url` opens a new one. Returns false if `url` was unknown.
    pub async fn evict_archive(&self, url: &str) -> bool {
        let had_connection = self.connections.remove(url).is_some();
        self.metadata
            .invalidate(&(url.to_string(), MetadataKind::Header))
            .await;
        self.metadata
            .invalidate(&(url.to_string(), MetadataKind::Metadata))
            .await;
        let tiles = self.tiles.remove_url(url);
        debug!(url, tiles, "Evicted archive resources");
        had_connection
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats.snapshot()
    }
}

fn kind_mismatch(url: &str, kind: MetadataKind) -> ArchiveError {
    ArchiveError::Format(format!("cached {:?} for {} has the wrong kind", kind, url))
}
