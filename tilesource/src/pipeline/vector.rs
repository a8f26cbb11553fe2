//! Vector tile pipeline: archive fetch, then parse on a pool worker.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use super::{PipelineContext, RunResult};
use crate::archive::fetch_tile_cancellable;
use crate::error::SourceError;
use crate::tile::{LoadOutcome, Tile, TileData};
use crate::worker::{VectorTileRequest, WorkerHandle};

/// Loads vector tiles for one source.
#[derive(Clone)]
pub struct VectorPipeline {
    ctx: Arc<PipelineContext>,
}

impl VectorPipeline {
    /// The registry's worker pool must already exist.
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Builds the descriptor sent to the worker along with the payload.
    pub fn request_for(&self, tile: &Tile, reload: bool) -> VectorTileRequest {
        let id = tile.id();
        let options = &self.ctx.options;
        VectorTileRequest {
            tile_id: id,
            zoom: id.overscaled_z,
            tile_size: options.tile_size.saturating_mul(id.overscale_factor()),
            source_id: self.ctx.source_id.clone(),
            scope: options.scope.clone(),
            show_collision_boxes: options.show_collision_boxes,
            promote_id: options.promote_id.clone(),
            is_symbol_tile: tile.is_symbol_tile(),
            shadow_casters: options.shadow_casters,
            reload,
        }
    }

    fn worker_for(
        &self,
        tile: &Tile,
        reuse: Option<Arc<WorkerHandle>>,
    ) -> Result<(Arc<WorkerHandle>, bool), SourceError> {
        if let Some(worker) = reuse {
            return Ok((worker, true));
        }
        let worker = self
            .ctx
            .registry
            .next_worker()
            .ok_or_else(|| SourceError::WorkerPool("worker pool not started".to_string()))?;
        debug!(tile = %tile.id(), worker = worker.id(), "Assigned worker");
        tile.assign_worker(Arc::clone(&worker));
        Ok((worker, false))
    }

    pub(crate) async fn run(&self, tile: &Tile, reuse: Option<Arc<WorkerHandle>>) -> RunResult {
        let (worker, reload) = match self.worker_for(tile, reuse) {
            Ok(assigned) => assigned,
            Err(e) => return (LoadOutcome::Errored, Err(e)),
        };
        let request = self.request_for(tile, reload);
        let cancel = tile.cancel_token();
        let coord = self.ctx.archive_coord(tile.id().canonical);

        let fetched =
            fetch_tile_cancellable(self.ctx.connection.archive().as_ref(), coord, cancel.clone())
                .await;
        if tile.is_aborted() {
            return (LoadOutcome::Dropped, Ok(()));
        }

        let payload = match fetched {
            Ok(Some(payload)) => payload,
            Ok(None) => return (self.loaded(TileData::Empty), Ok(())),
            Err(e) if e.is_cancellation() => return (LoadOutcome::Dropped, Ok(())),
            Err(e) if e.is_not_found() => return (self.loaded(TileData::Empty), Ok(())),
            Err(e) => {
                error!(source = %self.ctx.source_id, tile = %tile.id(), error = %e, "Tile fetch failed");
                return (LoadOutcome::Errored, Err(e.into()));
            }
        };

        match worker.parse(request, payload, cancel).await {
            Ok(Some(_)) | Ok(None) if tile.is_aborted() => (LoadOutcome::Dropped, Ok(())),
            Ok(Some(parsed)) => (self.loaded(TileData::Vector(Arc::new(parsed))), Ok(())),
            Ok(None) => (LoadOutcome::Dropped, Ok(())),
            Err(e) => {
                error!(source = %self.ctx.source_id, tile = %tile.id(), error = %e, "Tile parse failed");
                (LoadOutcome::Errored, Err(e.into()))
            }
        }
    }

    fn loaded(&self, data: TileData) -> LoadOutcome {
        LoadOutcome::Loaded {
            data,
            expires_at: self.ctx.options.tile_ttl.map(|ttl| Instant::now() + ttl),
        }
    }
}
