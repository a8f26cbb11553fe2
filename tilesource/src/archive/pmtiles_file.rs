//! Local PMTiles file back-end.
//!
//! The container format is parsed by the `pmtiles2` crate. The file is
//! opened lazily on first access and every read runs on the blocking pool,
//! since `pmtiles2` works on synchronous `Read + Seek` handles.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use pmtiles2::{Compression, PMTiles};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    ArchiveError, ArchiveHeader, ArchiveOpener, ArchiveReader, ArchiveTileType, BoxFuture,
    TileCompression,
};
use crate::coord::CanonicalTileId;

type Reader = PMTiles<BufReader<File>>;

/// An opened archive plus the values read from its header.
struct OpenedArchive {
    reader: Mutex<Reader>,
    compression: Compression,
    header: ArchiveHeader,
    metadata: serde_json::Value,
}

/// Archive backed by a `.pmtiles` file on the local filesystem.
pub struct PmtilesFileArchive {
    url: String,
    path: PathBuf,
    opened: OnceCell<Arc<OpenedArchive>>,
}

impl PmtilesFileArchive {
    /// Create a handle for `path`. Nothing is read until the first request.
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            opened: OnceCell::new(),
        }
    }

    /// Filesystem path of the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn opened(&self) -> Result<Arc<OpenedArchive>, ArchiveError> {
        let opened = self
            .opened
            .get_or_try_init(|| {
                let path = self.path.clone();
                async move {
                    tokio::task::spawn_blocking(move || open_archive(&path))
                        .await
                        .map_err(|e| ArchiveError::Io(format!("archive reader panicked: {}", e)))?
                        .map(Arc::new)
                }
            })
            .await?;
        Ok(Arc::clone(opened))
    }
}

fn open_archive(path: &Path) -> Result<OpenedArchive, ArchiveError> {
    debug!(path = %path.display(), "Opening PMTiles archive");
    let file = File::open(path)?;
    let reader = PMTiles::from_reader(BufReader::new(file))
        .map_err(|e| ArchiveError::Format(e.to_string()))?;

    let header = ArchiveHeader {
        min_zoom: Some(reader.min_zoom),
        max_zoom: Some(reader.max_zoom),
        min_lon: Some(reader.min_longitude),
        min_lat: Some(reader.min_latitude),
        max_lon: Some(reader.max_longitude),
        max_lat: Some(reader.max_latitude),
        center_lon: Some(reader.center_longitude),
        center_lat: Some(reader.center_latitude),
        center_zoom: Some(reader.center_zoom),
        tile_type: map_tile_type(reader.tile_type),
        tile_compression: map_compression(reader.tile_compression),
    };
    let metadata = metadata_document(&reader.meta_data)?;

    Ok(OpenedArchive {
        compression: reader.tile_compression,
        reader: Mutex::new(reader),
        header,
        metadata,
    })
}

#[allow(unreachable_patterns)]
fn map_tile_type(tile_type: pmtiles2::TileType) -> ArchiveTileType {
    match tile_type {
        pmtiles2::TileType::Mvt => ArchiveTileType::Mvt,
        pmtiles2::TileType::Png => ArchiveTileType::Png,
        pmtiles2::TileType::Jpeg => ArchiveTileType::Jpeg,
        pmtiles2::TileType::WebP => ArchiveTileType::Webp,
        _ => ArchiveTileType::Unknown,
    }
}

#[allow(unreachable_patterns)]
fn map_compression(compression: pmtiles2::Compression) -> TileCompression {
    match compression {
        pmtiles2::Compression::None => TileCompression::None,
        pmtiles2::Compression::GZip => TileCompression::Gzip,
        pmtiles2::Compression::Brotli => TileCompression::Brotli,
        pmtiles2::Compression::ZStd => TileCompression::Zstd,
        _ => TileCompression::Unknown,
    }
}

/// The archive's JSON metadata as a document; an archive without one
/// yields an empty object.
fn metadata_document(
    meta_data: &impl serde::Serialize,
) -> Result<serde_json::Value, ArchiveError> {
    let value = serde_json::to_value(meta_data)
        .map_err(|e| ArchiveError::Format(format!("metadata: {}", e)))?;
    Ok(match value {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other,
    })
}

/// Undo the archive-level tile compression.
fn decompress(data: Vec<u8>, compression: Compression) -> Result<Vec<u8>, ArchiveError> {
    match compression {
        Compression::None | Compression::Unknown => Ok(data),
        other => pmtiles2::util::decompress_all(other, &data)
            .map_err(|e| ArchiveError::Format(format!("{:?} tile payload: {}", other, e))),
    }
}

impl ArchiveReader for PmtilesFileArchive {
    fn url(&self) -> &str {
        &self.url
    }

    fn get_header(&self) -> BoxFuture<'_, Result<ArchiveHeader, ArchiveError>> {
        Box::pin(async move { Ok(self.opened().await?.header.clone()) })
    }

    fn get_metadata(&self) -> BoxFuture<'_, Result<serde_json::Value, ArchiveError>> {
        Box::pin(async move { Ok(self.opened().await?.metadata.clone()) })
    }

    fn fetch_tile(
        &self,
        tile: CanonicalTileId,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<Option<Bytes>, ArchiveError>> {
        Box::pin(async move {
            let opened = self.opened().await?;
            let compression = opened.compression;
            tokio::task::spawn_blocking(move || {
                if cancel.is_cancelled() {
                    return Err(ArchiveError::Cancelled);
                }
                let raw = opened
                    .reader
                    .lock()
                    .get_tile(u64::from(tile.x), u64::from(tile.y), tile.z)?;
                match raw {
                    Some(data) => Ok(Some(Bytes::from(decompress(data, compression)?))),
                    None => Ok(None),
                }
            })
            .await
            .map_err(|e| ArchiveError::Io(format!("tile reader panicked: {}", e)))?
        })
    }
}

/// Opens [`PmtilesFileArchive`]s for filesystem paths and `file://` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileArchiveOpener;

impl FileArchiveOpener {
    /// Strips `pmtiles://` and `file://` prefixes from `url`.
    pub fn path_for(url: &str) -> PathBuf {
        let stripped = url.strip_prefix("pmtiles://").unwrap_or(url);
        let stripped = stripped.strip_prefix("file://").unwrap_or(stripped);
        PathBuf::from(stripped)
    }
}

impl ArchiveOpener for FileArchiveOpener {
    fn open(&self, url: &str) -> Arc<dyn ArchiveReader> {
        Arc::new(PmtilesFileArchive::new(url, Self::path_for(url)))
    }
}
