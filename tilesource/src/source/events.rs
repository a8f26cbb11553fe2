//! Notifications emitted by a tile source.

use crate::error::SourceError;

/// What became available in a `Data` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Header and metadata are parsed.
    Metadata,
    /// Tiles can be requested.
    Content,
}

/// Event broadcast to every subscriber of a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    DataLoading {
        source_id: String,
    },
    Data {
        source_id: String,
        kind: DataKind,
    },
    Error {
        source_id: String,
        error: SourceError,
        /// Extra detail, such as the tile being loaded.
        context: Option<String>,
    },
}

impl SourceEvent {
    pub fn source_id(&self) -> &str {
        match self {
            Self::DataLoading { source_id }
            | Self::Data { source_id, .. }
            | Self::Error { source_id, .. } => source_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
