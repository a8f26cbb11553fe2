//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;

use tilesource::archive::{ArchiveHeader, ArchiveTileType, MemoryArchive, MemoryArchiveOpener};
use tilesource::config::{RegistryConfig, SourceOptions};
use tilesource::coord::{CanonicalTileId, OverscaledTileId};
use tilesource::registry::SharedResourceRegistry;
use tilesource::source::{ArchiveTileSource, SourceEvent};
use tilesource::tile::Tile;
use tilesource::worker::{
    ParseError, ParsedVectorTile, VectorLayerSummary, VectorTileParser, VectorTileRequest,
};

// ============================================================================
// Archives
// ============================================================================

pub const VECTOR_URL: &str = "mem://vector.pmtiles";
pub const RASTER_URL: &str = "mem://raster.pmtiles";

/// MVT archive with zoom 0-14 and bounds [-10, -10, 10, 10].
pub fn vector_archive() -> MemoryArchive {
    MemoryArchive::new(
        VECTOR_URL,
        ArchiveHeader::new(ArchiveTileType::Mvt)
            .with_zoom_range(0, 14)
            .with_bounds([-10.0, -10.0, 10.0, 10.0]),
    )
    .with_metadata(serde_json::json!({"name": "roads", "format": "pbf"}))
    .with_tile(CanonicalTileId::new(0, 0, 0), b"world".to_vec())
    .with_tile(CanonicalTileId::new(1, 0, 0), b"nw".to_vec())
    .with_tile(CanonicalTileId::new(1, 1, 0), b"ne".to_vec())
}

/// PNG archive with one distinct solid-colour tile per address at zoom 2.
pub fn raster_archive() -> MemoryArchive {
    (0..4).fold(
        MemoryArchive::new(
            RASTER_URL,
            ArchiveHeader::new(ArchiveTileType::Png).with_zoom_range(0, 2),
        ),
        |archive, x| {
            archive.with_tile(
                CanonicalTileId::new(2, x, 0),
                png_bytes(8, 8, [x as u8 * 60, 0, 0, 255]),
            )
        },
    )
}

pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

// ============================================================================
// Registry and sources
// ============================================================================

pub fn registry_with(
    config: RegistryConfig,
    archives: Vec<Arc<MemoryArchive>>,
) -> (Arc<MemoryArchiveOpener>, Arc<SharedResourceRegistry>) {
    let opener = Arc::new(
        archives
            .into_iter()
            .fold(MemoryArchiveOpener::new(), |o, a| o.with_archive(a)),
    );
    let registry = Arc::new(SharedResourceRegistry::new(config, opener.clone()));
    (opener, registry)
}

pub fn vector_source(
    id: &str,
    registry: &Arc<SharedResourceRegistry>,
    parser: Arc<RecordingParser>,
) -> ArchiveTileSource {
    ArchiveTileSource::new(id, SourceOptions::new(VECTOR_URL), Arc::clone(registry))
        .with_parser(parser)
}

pub fn tile(z: u8, x: u32, y: u32) -> Tile {
    Tile::new(OverscaledTileId::from_canonical(CanonicalTileId::new(z, x, y)))
}

pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<SourceEvent>) -> Vec<SourceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Parser
// ============================================================================

/// Parser that records every request it sees and the thread it ran on.
#[derive(Default)]
pub struct RecordingParser {
    calls: Mutex<Vec<(VectorTileRequest, String)>>,
}

impl RecordingParser {
    pub fn calls(&self) -> Vec<(VectorTileRequest, String)> {
        self.calls.lock().clone()
    }
}

impl VectorTileParser for RecordingParser {
    fn parse(
        &self,
        request: &VectorTileRequest,
        payload: &[u8],
    ) -> Result<ParsedVectorTile, ParseError> {
        let thread = std::thread::current()
            .name()
            .unwrap_or_default()
            .to_string();
        self.calls.lock().push((request.clone(), thread));
        Ok(ParsedVectorTile {
            tile_id: request.tile_id.canonical,
            layers: vec![VectorLayerSummary {
                name: "recorded".into(),
                version: 2,
                extent: 4096,
                feature_count: payload.len(),
                promoted_ids: 0,
            }],
            payload_bytes: payload.len(),
        })
    }
}
