//! Archive header model.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bounds::LngLatBounds;

/// Payload type declared by an archive.
///
/// Codes follow the PMTiles v3 header (`0` unknown, `1` MVT, `2` PNG,
/// `3` JPEG, `4` WebP, `5` AVIF).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveTileType {
    Unknown,
    /// Mapbox Vector Tiles
    Mvt,
    Png,
    Jpeg,
    Webp,
    Avif,
}

impl ArchiveTileType {
    /// Maps a header type code to a tile type; unassigned codes are `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Mvt,
            2 => Self::Png,
            3 => Self::Jpeg,
            4 => Self::Webp,
            5 => Self::Avif,
            _ => Self::Unknown,
        }
    }

    /// MIME type of the payloads, if known.
    pub const fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Mvt => Some("application/vnd.mapbox-vector-tile"),
            Self::Png => Some("image/png"),
            Self::Jpeg => Some("image/jpeg"),
            Self::Webp => Some("image/webp"),
            Self::Avif => Some("image/avif"),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for ArchiveTileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Mvt => "mvt",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Avif => "avif",
        };
        f.write_str(name)
    }
}

/// Compression applied to individual tile payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileCompression {
    Unknown,
    #[default]
    None,
    Gzip,
    Brotli,
    Zstd,
}

/// Parsed archive header.
///
/// Every field except the tile type is optional: archives written by
/// different tools omit different fields, and the adapter only enables
/// bounds filtering when the full extent is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveHeader {
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,
    pub min_lon: Option<f64>,
    pub min_lat: Option<f64>,
    pub max_lon: Option<f64>,
    pub max_lat: Option<f64>,
    pub center_lon: Option<f64>,
    pub center_lat: Option<f64>,
    pub center_zoom: Option<u8>,
    pub tile_type: ArchiveTileType,
    pub tile_compression: TileCompression,
}

impl ArchiveHeader {
    /// Creates a header with only the tile type known.
    pub fn new(tile_type: ArchiveTileType) -> Self {
        Self {
            min_zoom: None,
            max_zoom: None,
            min_lon: None,
            min_lat: None,
            max_lon: None,
            max_lat: None,
            center_lon: None,
            center_lat: None,
            center_zoom: None,
            tile_type,
            tile_compression: TileCompression::None,
        }
    }

    /// Set the zoom range.
    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = Some(min_zoom);
        self.max_zoom = Some(max_zoom);
        self
    }

    /// Set the spatial extent as `[west, south, east, north]`.
    pub fn with_bounds(mut self, bounds: [f64; 4]) -> Self {
        self.min_lon = Some(bounds[0]);
        self.min_lat = Some(bounds[1]);
        self.max_lon = Some(bounds[2]);
        self.max_lat = Some(bounds[3]);
        self
    }

    /// Set the tile compression.
    pub fn with_compression(mut self, compression: TileCompression) -> Self {
        self.tile_compression = compression;
        self
    }

    /// Zoom range, if both ends are declared.
    pub fn zoom_range(&self) -> Option<(u8, u8)> {
        Some((self.min_zoom?, self.max_zoom?))
    }

    /// Spatial extent, if all four edges are declared.
    pub fn bounds(&self) -> Option<LngLatBounds> {
        Some(LngLatBounds::new(
            self.min_lon?,
            self.min_lat?,
            self.max_lon?,
            self.max_lat?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(ArchiveTileType::Unknown.content_type(), None);
        assert_eq!(
            ArchiveTileType::Mvt.content_type(),
            Some("application/vnd.mapbox-vector-tile")
        );
        assert_eq!(ArchiveTileType::Png.content_type(), Some("image/png"));
        assert_eq!(ArchiveTileType::Jpeg.content_type(), Some("image/jpeg"));
        assert_eq!(ArchiveTileType::Webp.content_type(), Some("image/webp"));
        assert_eq!(ArchiveTileType::Avif.content_type(), Some("image/avif"));
    }

    #[test]
    fn test_from_code() {
        assert_eq!(ArchiveTileType::from_code(0), ArchiveTileType::Unknown);
        assert_eq!(ArchiveTileType::from_code(1), ArchiveTileType::Mvt);
        assert_eq!(ArchiveTileType::from_code(5), ArchiveTileType::Avif);
        assert_eq!(ArchiveTileType::from_code(42), ArchiveTileType::Unknown);
    }

    #[test]
    fn test_partial_bounds_are_absent() {
        let mut header = ArchiveHeader::new(ArchiveTileType::Png).with_bounds([-1.0, -1.0, 1.0, 1.0]);
        assert!(header.bounds().is_some());

        header.max_lat = None;
        assert!(header.bounds().is_none());
    }

    #[test]
    fn test_zoom_range_requires_both_ends() {
        let mut header = ArchiveHeader::new(ArchiveTileType::Mvt).with_zoom_range(2, 9);
        assert_eq!(header.zoom_range(), Some((2, 9)));

        header.min_zoom = None;
        assert_eq!(header.zoom_range(), None);
    }

    #[test]
    fn test_header_serde_roundtrip_names() {
        let header = ArchiveHeader::new(ArchiveTileType::Webp).with_compression(TileCompression::Gzip);
        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(json["tile_type"], "webp");
        assert_eq!(json["tile_compression"], "gzip");
    }
}
