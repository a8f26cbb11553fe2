//! Raster tile pipeline: decoded-tile cache, archive fetch, image decode.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::{PipelineContext, RunResult};
use crate::archive::fetch_tile_cancellable;
use crate::decode::{blank_bitmap, decode_off_thread, Bitmap, DecodePath, ImageDecoder};
use crate::error::SourceError;
use crate::registry::TileCacheKey;
use crate::tile::{LoadOutcome, Tile, TileData};

/// Loads raster tiles for one source.
#[derive(Clone)]
pub struct RasterPipeline {
    ctx: Arc<PipelineContext>,
    decoder: Arc<dyn ImageDecoder>,
}

impl RasterPipeline {
    pub fn new(ctx: Arc<PipelineContext>, decoder: Arc<dyn ImageDecoder>) -> Self {
        Self { ctx, decoder }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub(crate) async fn run(&self, tile: &Tile) -> RunResult {
        let canonical = tile.id().canonical;
        let url = self.ctx.connection.url();

        if let Some(bitmap) = self.ctx.registry.get_tile(url, canonical) {
            debug!(source = %self.ctx.source_id, tile = %canonical, "Decoded tile cache hit");
            return (loaded(bitmap), Ok(()));
        }

        let fetched = fetch_tile_cancellable(
            self.ctx.connection.archive().as_ref(),
            self.ctx.archive_coord(canonical),
            tile.cancel_token(),
        )
        .await;
        if tile.is_aborted() {
            return (LoadOutcome::Dropped, Ok(()));
        }

        let payload = match fetched {
            Ok(Some(payload)) if !payload.is_empty() => payload,
            // Sparse coverage: show nothing rather than fail.
            Ok(_) => return (loaded(blank_bitmap(self.ctx.options.tile_size)), Ok(())),
            Err(e) if e.is_cancellation() => return (LoadOutcome::Dropped, Ok(())),
            Err(e) if e.is_not_found() => {
                return (loaded(blank_bitmap(self.ctx.options.tile_size)), Ok(()))
            }
            Err(e) => {
                error!(source = %self.ctx.source_id, tile = %canonical, error = %e, "Tile fetch failed");
                return (LoadOutcome::Errored, Err(e.into()));
            }
        };

        let decoded = decode_off_thread(
            Arc::clone(&self.decoder),
            payload,
            self.ctx.content_type.clone(),
        )
        .await;

        match decoded {
            Ok((bitmap, path)) => {
                if path == DecodePath::Typed {
                    warn!(source = %self.ctx.source_id, tile = %canonical, "Direct decode failed, used content-type fallback");
                }
                self.ctx
                    .registry
                    .put_tile(TileCacheKey::new(url, canonical), Arc::clone(&bitmap));
                if tile.is_aborted() {
                    return (LoadOutcome::Dropped, Ok(()));
                }
                (loaded(bitmap), Ok(()))
            }
            Err(e) => {
                error!(source = %self.ctx.source_id, tile = %canonical, error = %e, "Tile decode failed");
                (
                    LoadOutcome::Errored,
                    Err(SourceError::Decode {
                        source_id: self.ctx.source_id.clone(),
                        reason: e.to_string(),
                    }),
                )
            }
        }
    }
}

fn loaded(bitmap: Bitmap) -> LoadOutcome {
    LoadOutcome::Loaded {
        data: TileData::Raster(bitmap),
        expires_at: None,
    }
}
