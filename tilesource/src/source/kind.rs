//! Tile kind classification.

use std::fmt;

use crate::archive::ArchiveTileType;

/// How a source's tiles are loaded, derived from the archive's tile type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    Vector,
    RasterPng,
    RasterJpeg,
    RasterWebp,
    RasterAvif,
    Unsupported,
}

impl TileKind {
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector)
    }

    pub fn is_raster(&self) -> bool {
        matches!(
            self,
            Self::RasterPng | Self::RasterJpeg | Self::RasterWebp | Self::RasterAvif
        )
    }
}

impl From<ArchiveTileType> for TileKind {
    fn from(tile_type: ArchiveTileType) -> Self {
        match tile_type {
            ArchiveTileType::Mvt => Self::Vector,
            ArchiveTileType::Png => Self::RasterPng,
            ArchiveTileType::Jpeg => Self::RasterJpeg,
            ArchiveTileType::Webp => Self::RasterWebp,
            ArchiveTileType::Avif => Self::RasterAvif,
            ArchiveTileType::Unknown => Self::Unsupported,
        }
    }
}

impl fmt::Display for TileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vector => "vector",
            Self::RasterPng => "raster-png",
            Self::RasterJpeg => "raster-jpeg",
            Self::RasterWebp => "raster-webp",
            Self::RasterAvif => "raster-avif",
            Self::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}
