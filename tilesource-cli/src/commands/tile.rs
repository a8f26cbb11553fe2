//! `tile` command: load one tile through the source.

use std::path::Path;

use tilesource::coord::{checked_tile_id, OverscaledTileId};
use tilesource::decode::Bitmap;
use tilesource::tile::{Tile, TileData};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Load tile `z/x/y` from `archive`, printing or saving the result.
pub async fn run(
    runner: &CliRunner,
    archive: &Path,
    z: u8,
    x: u32,
    y: u32,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let id = checked_tile_id(z, x, y).map_err(|e| CliError::Config(e.to_string()))?;
    let source = runner.open_source(archive).await?;

    if !source.has_tile(&id) {
        return Err(CliError::OutOfBounds(id.to_string()));
    }

    let tile = Tile::new(OverscaledTileId::from_canonical(id));
    source.load_tile(&tile).await.map_err(CliError::Tile)?;

    match tile.data() {
        TileData::Raster(bitmap) => {
            println!("Raster tile {}: {}x{}", id, bitmap.width(), bitmap.height());
            if let Some(path) = output {
                write_png(&bitmap, path)?;
                println!("Saved to {}", path.display());
            }
        }
        TileData::Vector(parsed) => {
            println!(
                "Vector tile {}: {} layers, {} features, {} bytes",
                id,
                parsed.layers.len(),
                parsed.feature_count(),
                parsed.payload_bytes
            );
            for layer in &parsed.layers {
                println!(
                    "  {:<24} {:>6} features  (extent {}, v{})",
                    layer.name, layer.feature_count, layer.extent, layer.version
                );
            }
        }
        TileData::Empty => println!("Tile {} is empty", id),
    }
    Ok(())
}

/// Encode `bitmap` as PNG at `path`.
pub fn write_png(bitmap: &Bitmap, path: &Path) -> Result<(), CliError> {
    bitmap
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| CliError::FileWrite {
            path: path.display().to_string(),
            error: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilesource::decode::blank_bitmap;

    #[test]
    fn test_write_png() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tile.png");
        write_png(&blank_bitmap(16), &path).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (16, 16));
    }

    #[test]
    fn test_write_png_bad_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing").join("tile.png");
        assert!(matches!(
            write_png(&blank_bitmap(1), &path),
            Err(CliError::FileWrite { .. })
        ));
    }
}
