//! Errors surfaced by tile sources and their pipelines.

use thiserror::Error;

use crate::archive::{ArchiveError, ArchiveTileType};
use crate::worker::ParseError;

/// Error reported to the renderer through `load`, `load_tile` and error events.
///
/// Clone so a single failure can be broadcast to every event subscriber.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// Reading the archive failed.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Both raster decode paths failed.
    #[error("Could not decode image for source '{source_id}': {reason}")]
    Decode { source_id: String, reason: String },

    /// The vector tile parser rejected the payload.
    #[error("Vector tile parse error: {0}")]
    Parse(#[from] ParseError),

    /// The archive declares a tile type this engine cannot serve.
    #[error("Source '{source_id}' has unsupported tile type '{tile_type}'")]
    UnsupportedTileKind {
        source_id: String,
        tile_type: ArchiveTileType,
    },

    /// A tile was requested before `load` succeeded.
    #[error("Source '{source_id}' is not loaded")]
    NotLoaded { source_id: String },

    /// The worker pool could not be started.
    #[error("Worker pool unavailable: {0}")]
    WorkerPool(String),

    /// The request was cancelled. Pipelines swallow this; it never reaches a caller.
    #[error("Cancelled")]
    Cancelled,
}

impl SourceError {
    /// Returns true for cancellation-class errors.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Archive(e) => e.is_cancellation(),
            _ => false,
        }
    }
}

/// Result alias for source operations.
pub type SourceResult<T> = Result<T, SourceError>;
