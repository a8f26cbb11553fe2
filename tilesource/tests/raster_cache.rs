//! Integration tests for the raster pipeline and the decoded tile cache.
//!
//! Run with: `cargo test --test raster_cache`

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use tilesource::config::{RegistryConfig, SourceOptions};
use tilesource::coord::CanonicalTileId;
use tilesource::decode::{DecodeError, ImageCrateDecoder, ImageDecoder};
use tilesource::registry::TileCacheKey;
use tilesource::source::ArchiveTileSource;
use tilesource::tile::TileState;

use common::*;

/// Decoder that refuses untyped buffers, like some platform decoders do.
#[derive(Default)]
struct TypedOnly {
    raw_calls: AtomicUsize,
}

impl ImageDecoder for TypedOnly {
    fn decode_raw(&self, _bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
        self.raw_calls.fetch_add(1, Ordering::SeqCst);
        Err(DecodeError::Image("untyped buffers unsupported".into()))
    }

    fn decode_typed(&self, bytes: &[u8], content_type: &str) -> Result<RgbaImage, DecodeError> {
        ImageCrateDecoder.decode_typed(bytes, content_type)
    }
}

fn key(x: u32) -> TileCacheKey {
    TileCacheKey::new(RASTER_URL, CanonicalTileId::new(2, x, 0))
}

#[tokio::test]
async fn test_fifo_eviction_scenario() {
    let archive = Arc::new(raster_archive());
    let (_opener, registry) = registry_with(
        RegistryConfig::default().with_tile_cache_capacity(2),
        vec![archive.clone()],
    );
    let source = ArchiveTileSource::new(
        "satellite",
        SourceOptions::new(RASTER_URL),
        registry.clone(),
    );
    source.load().await.unwrap();

    // A, B, C: inserting C evicts A.
    for x in 0..3 {
        source.load_tile(&tile(2, x, 0)).await.unwrap();
    }
    assert_eq!(registry.tile_cache().keys(), vec![key(1), key(2)]);

    // Reading B hits the cache without touching the archive...
    let b = tile(2, 1, 0);
    source.load_tile(&b).await.unwrap();
    assert_eq!(b.state(), TileState::Loaded);
    assert_eq!(archive.fetch_counts().tiles, 3);

    // ...and does not protect it: D evicts B, not C.
    source.load_tile(&tile(2, 3, 0)).await.unwrap();
    assert_eq!(registry.tile_cache().keys(), vec![key(2), key(3)]);
    assert!(registry.tile_cache().len() <= 2);

    let stats = registry.stats();
    assert_eq!(stats.tile_evictions, 2);
    assert_eq!(stats.tile_hits, 1);
}

#[tokio::test]
async fn test_layers_share_decoded_tiles() {
    let archive = Arc::new(raster_archive());
    let (_opener, registry) = registry_with(RegistryConfig::default(), vec![archive.clone()]);

    let day = ArchiveTileSource::new("day", SourceOptions::new(RASTER_URL), registry.clone());
    let night = ArchiveTileSource::new("night", SourceOptions::new(RASTER_URL), registry.clone());
    day.load().await.unwrap();
    night.load().await.unwrap();

    let a = tile(2, 2, 0);
    let b = tile(2, 2, 0);
    day.load_tile(&a).await.unwrap();
    night.load_tile(&b).await.unwrap();

    assert!(Arc::ptr_eq(&a.bitmap().unwrap(), &b.bitmap().unwrap()));
    assert_eq!(archive.fetch_counts().tiles, 1);
    assert_eq!(a.bitmap().unwrap().get_pixel(0, 0).0, [120, 0, 0, 255]);
}

#[tokio::test]
async fn test_fallback_decode_caches_and_reports_nothing() {
    let (_opener, registry) =
        registry_with(RegistryConfig::default(), vec![Arc::new(raster_archive())]);
    let decoder = Arc::new(TypedOnly::default());
    let source = ArchiveTileSource::new("satellite", SourceOptions::new(RASTER_URL), registry.clone())
        .with_decoder(decoder.clone());
    source.load().await.unwrap();
    let mut events = source.subscribe();

    let t = tile(2, 1, 0);
    source.load_tile(&t).await.unwrap();

    assert_eq!(t.state(), TileState::Loaded);
    assert_eq!(t.bitmap().unwrap().dimensions(), (8, 8));
    assert!(registry.tile_cache().contains(&key(1)));
    assert_eq!(decoder.raw_calls.load(Ordering::SeqCst), 1);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_sparse_archive_yields_blank_tiles() {
    let (_opener, registry) =
        registry_with(RegistryConfig::default(), vec![Arc::new(raster_archive())]);
    let source = ArchiveTileSource::new(
        "satellite",
        SourceOptions::new(RASTER_URL).with_tile_size(256),
        registry,
    );
    source.load().await.unwrap();

    let t = tile(2, 0, 3);
    source.load_tile(&t).await.unwrap();
    let bitmap = t.bitmap().unwrap();
    assert_eq!(bitmap.dimensions(), (256, 256));
    assert!(bitmap.pixels().all(|p| p.0 == [0, 0, 0, 0]));
}
