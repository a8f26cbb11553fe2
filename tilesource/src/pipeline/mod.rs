//! Tile loading pipelines.
//!
//! A loaded source picks one pipeline from its archive's tile type:
//!
//! - [`VectorPipeline`]: fetch, then parse on a pool worker
//! - [`RasterPipeline`]: cache lookup, fetch, decode, cache
//!
//! Both share the per-tile serialization in [`TilePipeline::load_tile`]:
//! at most one load per tile is in flight, and a request that arrives
//! meanwhile runs once, after it, as a reload.

mod raster;
mod vector;

pub use raster::RasterPipeline;
pub use vector::VectorPipeline;

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::debug;

use crate::archive::BoxFuture;
use crate::config::{Scheme, SourceOptions};
use crate::coord::CanonicalTileId;
use crate::error::SourceResult;
use crate::registry::{ArchiveConnection, SharedResourceRegistry};
use crate::tile::{LoadOutcome, LoadStart, Tile};

/// Everything a pipeline needs about its source.
pub struct PipelineContext {
    pub source_id: String,
    pub options: SourceOptions,
    pub content_type: String,
    pub registry: Arc<SharedResourceRegistry>,
    pub connection: Arc<ArchiveConnection>,
}

impl PipelineContext {
    /// Address of `tile` inside the archive.
    pub fn archive_coord(&self, tile: CanonicalTileId) -> CanonicalTileId {
        match self.options.scheme {
            Scheme::Xyz => tile,
            Scheme::Tms => CanonicalTileId::new(tile.z, tile.x, tile.tms_y()),
        }
    }
}

/// The `load_tile` strategy of a loaded source.
#[derive(Clone)]
pub enum TilePipeline {
    Vector(VectorPipeline),
    Raster(RasterPipeline),
}

impl TilePipeline {
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }

    /// Loads `tile`, or attaches to the load already in flight for it.
    ///
    /// Cancelled and aborted loads complete with `Ok(())` and no data.
    /// Dropping the returned future before it completes settles the tile
    /// as dropped, so later requests are not left waiting on it.
    pub async fn load_tile(&self, tile: &Tile) -> SourceResult<()> {
        let reuse_worker = match tile.start_load() {
            LoadStart::Aborted => return Ok(()),
            // A dropped sender means the tile was destroyed.
            LoadStart::Continuation(rx) => return rx.await.unwrap_or(Ok(())),
            LoadStart::Begin(worker) => worker,
        };

        let in_flight = InFlight {
            pipeline: self,
            tile,
            settled: false,
        };
        let (outcome, result) = match self {
            Self::Vector(pipeline) => pipeline.run(tile, reuse_worker).await,
            Self::Raster(pipeline) => pipeline.run(tile).await,
        };
        in_flight.settle(outcome);
        result
    }

    fn spawn_reload(&self, tile: Tile, continuation: oneshot::Sender<SourceResult<()>>) {
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.clone().reload(tile, continuation));
            }
            // Outside a runtime the waiter sees a closed channel and
            // completes quietly.
            Err(_) => drop(continuation),
        }
    }

    fn reload(
        self,
        tile: Tile,
        continuation: oneshot::Sender<SourceResult<()>>,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let result = self.load_tile(&tile).await;
            let _ = continuation.send(result);
        })
    }
}

/// A started load. Settles the tile exactly once, from `settle` or, if the
/// load future is dropped first, from `Drop`.
struct InFlight<'a> {
    pipeline: &'a TilePipeline,
    tile: &'a Tile,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: LoadOutcome) {
        self.settled = true;
        self.finish(outcome);
    }

    fn finish(&self, outcome: LoadOutcome) {
        if let Some(continuation) = self.tile.finish_load(outcome) {
            self.pipeline.spawn_reload(self.tile.clone(), continuation);
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(tile = %self.tile.id(), "Tile load dropped before completion");
            self.finish(LoadOutcome::Dropped);
        }
    }
}

/// Outcome to record on the tile plus the result for the caller.
pub(crate) type RunResult = (LoadOutcome, SourceResult<()>);
