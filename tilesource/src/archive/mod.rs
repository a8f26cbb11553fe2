//! Archive access abstraction
//!
//! The on-disk/over-the-wire archive format is handled by external crates.
//! This module defines the narrow contract the tile-source engine needs from
//! an archive: read its header, read its metadata document, and fetch one
//! tile payload, cancellably.
//!
//! Two back-ends are provided:
//! - [`MemoryArchive`] keeps everything in memory (embedding, tests)
//! - [`PmtilesFileArchive`] reads local `.pmtiles` files through `pmtiles2`
//!
//! # Example
//!
//! ```ignore
//! use tilesource::archive::{ArchiveOpener, FileArchiveOpener};
//!
//! let archive = FileArchiveOpener.open("file:///data/basemap.pmtiles");
//! let header = archive.get_header().await?;
//! ```

mod header;
mod memory;
mod pmtiles_file;

pub use header::{ArchiveHeader, ArchiveTileType, TileCompression};
pub use memory::{FetchCounts, MemoryArchive, MemoryArchiveOpener};
pub use pmtiles_file::{FileArchiveOpener, PmtilesFileArchive};

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::coord::CanonicalTileId;

/// Boxed future type for dyn-compatible async methods.
pub use futures::future::BoxFuture;

/// Errors reported by archive back-ends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArchiveError {
    /// The request was cancelled before it completed.
    #[error("Request cancelled")]
    Cancelled,

    /// The archive (or the requested resource) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Reading from the underlying storage failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The archive contents could not be interpreted.
    #[error("Invalid archive: {0}")]
    Format(String),

    /// The archive uses a feature this back-end cannot handle.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ArchiveError {
    /// Returns true for errors caused by cancellation rather than failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the requested resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            std::io::ErrorKind::Interrupted => Self::Cancelled,
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Read access to one tile archive.
///
/// Implementations must be `Send + Sync`; one handle is shared by every
/// layer that references the archive.
pub trait ArchiveReader: Send + Sync {
    /// Location the archive was opened from.
    fn url(&self) -> &str;

    /// Reads and parses the archive header.
    fn get_header(&self) -> BoxFuture<'_, Result<ArchiveHeader, ArchiveError>>;

    /// Reads the archive's JSON metadata document.
    fn get_metadata(&self) -> BoxFuture<'_, Result<serde_json::Value, ArchiveError>>;

    /// Fetches the payload for one tile.
    ///
    /// Returns `Ok(None)` when the archive has no tile at this address.
    /// Back-ends that can abort in-flight reads should watch `cancel` and
    /// return [`ArchiveError::Cancelled`] once it fires.
    fn fetch_tile(
        &self,
        tile: CanonicalTileId,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<Option<Bytes>, ArchiveError>>;
}

/// Creates archive handles for URLs.
///
/// Opening never fails: handles are lazy and report problems from their
/// first read.
pub trait ArchiveOpener: Send + Sync {
    fn open(&self, url: &str) -> Arc<dyn ArchiveReader>;
}

/// Fetches a tile, resolving to [`ArchiveError::Cancelled`] as soon as
/// `cancel` fires even if the back-end ignores the token.
pub async fn fetch_tile_cancellable(
    archive: &dyn ArchiveReader,
    tile: CanonicalTileId,
    cancel: CancellationToken,
) -> Result<Option<Bytes>, ArchiveError> {
    if cancel.is_cancelled() {
        return Err(ArchiveError::Cancelled);
    }
    let fetch = archive.fetch_tile(tile, cancel.clone());
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ArchiveError::Cancelled),
        result = fetch => result,
    }
}
