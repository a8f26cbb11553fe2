//! In-memory archive back-end.
//!
//! Holds a header, a metadata document and a tile map. Every read is counted
//! so callers can verify how often the archive was actually touched, and
//! failures or latency can be injected to exercise error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::{ArchiveError, ArchiveHeader, ArchiveOpener, ArchiveReader, BoxFuture};
use crate::coord::CanonicalTileId;

/// Number of reads served by a [`MemoryArchive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCounts {
    pub header: u64,
    pub metadata: u64,
    pub tiles: u64,
}

/// Archive held entirely in memory.
pub struct MemoryArchive {
    url: String,
    header: ArchiveHeader,
    metadata: serde_json::Value,
    tiles: HashMap<CanonicalTileId, Bytes>,
    latency: Option<Duration>,
    header_error: Option<ArchiveError>,
    tile_errors: HashMap<CanonicalTileId, ArchiveError>,
    header_fetches: AtomicU64,
    metadata_fetches: AtomicU64,
    tile_fetches: AtomicU64,
}

impl MemoryArchive {
    /// Create an empty archive with the given header.
    pub fn new(url: impl Into<String>, header: ArchiveHeader) -> Self {
        Self {
            url: url.into(),
            header,
            metadata: serde_json::Value::Object(Default::default()),
            tiles: HashMap::new(),
            latency: None,
            header_error: None,
            tile_errors: HashMap::new(),
            header_fetches: AtomicU64::new(0),
            metadata_fetches: AtomicU64::new(0),
            tile_fetches: AtomicU64::new(0),
        }
    }

    /// Set the metadata document.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a tile payload, addressed in the archive's own coordinates.
    pub fn with_tile(mut self, tile: CanonicalTileId, data: impl Into<Bytes>) -> Self {
        self.tiles.insert(tile, data.into());
        self
    }

    /// Delay every read by `latency`. Delayed tile reads honour cancellation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make header and metadata reads fail with `error`.
    pub fn with_header_error(mut self, error: ArchiveError) -> Self {
        self.header_error = Some(error);
        self
    }

    /// Make reads of one tile fail with `error`.
    pub fn with_tile_error(mut self, tile: CanonicalTileId, error: ArchiveError) -> Self {
        self.tile_errors.insert(tile, error);
        self
    }

    /// Reads served so far.
    pub fn fetch_counts(&self) -> FetchCounts {
        FetchCounts {
            header: self.header_fetches.load(Ordering::Relaxed),
            metadata: self.metadata_fetches.load(Ordering::Relaxed),
            tiles: self.tile_fetches.load(Ordering::Relaxed),
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl ArchiveReader for MemoryArchive {
    fn url(&self) -> &str {
        &self.url
    }

    fn get_header(&self) -> BoxFuture<'_, Result<ArchiveHeader, ArchiveError>> {
        Box::pin(async move {
            self.header_fetches.fetch_add(1, Ordering::Relaxed);
            self.simulate_latency().await;
            match &self.header_error {
                Some(err) => Err(err.clone()),
                None => Ok(self.header.clone()),
            }
        })
    }

    fn get_metadata(&self) -> BoxFuture<'_, Result<serde_json::Value, ArchiveError>> {
        Box::pin(async move {
            self.metadata_fetches.fetch_add(1, Ordering::Relaxed);
            self.simulate_latency().await;
            match &self.header_error {
                Some(err) => Err(err.clone()),
                None => Ok(self.metadata.clone()),
            }
        })
    }

    fn fetch_tile(
        &self,
        tile: CanonicalTileId,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<Option<Bytes>, ArchiveError>> {
        Box::pin(async move {
            self.tile_fetches.fetch_add(1, Ordering::Relaxed);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ArchiveError::Cancelled),
                _ = self.simulate_latency() => {}
            }
            if let Some(err) = self.tile_errors.get(&tile) {
                return Err(err.clone());
            }
            Ok(self.tiles.get(&tile).cloned())
        })
    }
}

/// Opener that hands out pre-registered [`MemoryArchive`]s by URL.
///
/// Unregistered URLs open an archive whose reads fail with `NotFound`.
#[derive(Default)]
pub struct MemoryArchiveOpener {
    archives: DashMap<String, Arc<MemoryArchive>>,
    opens: AtomicU64,
}

impl MemoryArchiveOpener {
    /// Create an opener with no archives registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an archive under its own URL.
    pub fn with_archive(self, archive: Arc<MemoryArchive>) -> Self {
        self.archives.insert(archive.url().to_string(), archive);
        self
    }

    /// Number of times [`ArchiveOpener::open`] was called.
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }
}

impl ArchiveOpener for MemoryArchiveOpener {
    fn open(&self, url: &str) -> Arc<dyn ArchiveReader> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        match self.archives.get(url) {
            Some(archive) => archive.value().clone(),
            None => Arc::new(
                MemoryArchive::new(url, ArchiveHeader::new(super::ArchiveTileType::Unknown))
                    .with_header_error(ArchiveError::NotFound(format!(
                        "no archive registered for {}",
                        url
                    ))),
            ),
        }
    }
}
