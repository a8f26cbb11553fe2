//! Vector tile worker pool.
//!
//! Vector tile payloads are parsed off the calling thread by a fixed set of
//! dedicated worker threads. Each worker owns a job channel; callers pick a
//! worker through the registry's round-robin cursor and await the result on
//! a oneshot channel.
//!
//! ```text
//! load_tile ──► next_worker() ──► WorkerHandle ──mpsc──► worker thread
//!     ▲                                                     │
//!     └───────────────────── oneshot ◄──── parser.parse() ──┘
//! ```
//!
//! The parsing itself is behind the [`VectorTileParser`] trait so a host can
//! supply its own dispatcher; [`MvtParser`] is the built-in one.

mod mvt;

pub use mvt::MvtParser;

use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::coord::{CanonicalTileId, OverscaledTileId};

/// Errors produced while parsing vector tiles.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Payload is not a valid vector tile.
    #[error("Malformed vector tile: {0}")]
    Malformed(String),

    /// Payload could not be decompressed.
    #[error("Failed to decompress vector tile: {0}")]
    Compression(String),

    /// The worker thread is gone.
    #[error("Worker {0} is unavailable")]
    WorkerUnavailable(usize),

    /// The parser panicked.
    #[error("Parser panicked: {0}")]
    Panicked(String),
}

/// Which feature property becomes the feature id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromoteId {
    /// Same property for every source layer.
    Property(String),
    /// Property per source layer name.
    PerLayer(HashMap<String, String>),
}

impl PromoteId {
    /// Property to promote for `layer`, if any.
    pub fn property_for(&self, layer: &str) -> Option<&str> {
        match self {
            PromoteId::Property(name) => Some(name),
            PromoteId::PerLayer(map) => map.get(layer).map(String::as_str),
        }
    }
}

/// Everything a worker needs to know to parse one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorTileRequest {
    pub tile_id: OverscaledTileId,
    /// Zoom the tile is displayed at.
    pub zoom: u8,
    /// Tile size in pixels, scaled by the overscale factor.
    pub tile_size: u32,
    pub source_id: String,
    pub scope: String,
    pub show_collision_boxes: bool,
    pub promote_id: Option<PromoteId>,
    pub is_symbol_tile: bool,
    pub shadow_casters: bool,
    /// Set when the request re-parses a tile on the worker that parsed it before.
    pub reload: bool,
}

/// Summary of one source layer inside a vector tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorLayerSummary {
    pub name: String,
    pub version: u32,
    pub extent: u32,
    pub feature_count: usize,
    /// Features carrying the promoted id property.
    pub promoted_ids: usize,
}

/// Result of parsing a vector tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedVectorTile {
    pub tile_id: CanonicalTileId,
    pub layers: Vec<VectorLayerSummary>,
    pub payload_bytes: usize,
}

impl ParsedVectorTile {
    /// An empty tile (no payload in the archive).
    pub fn empty(tile_id: CanonicalTileId) -> Self {
        Self {
            tile_id,
            layers: Vec::new(),
            payload_bytes: 0,
        }
    }

    /// Total features across all layers.
    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|l| l.feature_count).sum()
    }

    /// Looks up a layer by name.
    pub fn layer(&self, name: &str) -> Option<&VectorLayerSummary> {
        self.layers.iter().find(|l| l.name == name)
    }
}

/// Parses raw vector tile payloads. Runs on worker threads.
pub trait VectorTileParser: Send + Sync + 'static {
    fn parse(
        &self,
        request: &VectorTileRequest,
        payload: &[u8],
    ) -> Result<ParsedVectorTile, ParseError>;
}

struct ParseJob {
    request: VectorTileRequest,
    payload: Bytes,
    cancel: CancellationToken,
    reply: oneshot::Sender<Result<ParsedVectorTile, ParseError>>,
}

/// Handle to one worker thread.
pub struct WorkerHandle {
    id: usize,
    sender: mpsc::UnboundedSender<ParseJob>,
    dispatched: AtomicU64,
}

impl WorkerHandle {
    /// Spawns the worker thread.
    pub fn spawn(id: usize, parser: Arc<dyn VectorTileParser>) -> io::Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ParseJob>();

        std::thread::Builder::new()
            .name(format!("tile-worker-{}", id))
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    if job.cancel.is_cancelled() || job.reply.is_closed() {
                        continue;
                    }
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        parser.parse(&job.request, &job.payload)
                    }))
                    .unwrap_or_else(|payload| Err(ParseError::Panicked(panic_message(&payload))));
                    let _ = job.reply.send(result);
                }
                debug!(worker = id, "Worker thread exiting");
            })?;

        Ok(Self {
            id,
            sender,
            dispatched: AtomicU64::new(0),
        })
    }

    /// Position of this worker in the pool.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of jobs sent to this worker.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Parses `payload` on the worker thread.
    ///
    /// Returns `Ok(None)` if `cancel` fires before the worker replies.
    pub async fn parse(
        &self,
        request: VectorTileRequest,
        payload: Bytes,
        cancel: CancellationToken,
    ) -> Result<Option<ParsedVectorTile>, ParseError> {
        let (reply, result) = oneshot::channel();
        let job = ParseJob {
            request,
            payload,
            cancel: cancel.clone(),
            reply,
        };
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(job).is_err() {
            error!(worker = self.id, "Worker thread is gone");
            return Err(ParseError::WorkerUnavailable(self.id));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            reply = result => match reply {
                Ok(parsed) => parsed.map(Some),
                // Job was skipped because it was cancelled after dispatch
                Err(_) if cancel.is_cancelled() => Ok(None),
                Err(_) => Err(ParseError::WorkerUnavailable(self.id)),
            },
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Fixed-size pool of workers with a rotating cursor.
pub struct WorkerPool {
    workers: Vec<Arc<WorkerHandle>>,
    cursor: AtomicUsize,
}

impl WorkerPool {
    /// Spawns `size` workers sharing one parser. `size` is raised to at least 1.
    pub fn new(size: usize, parser: Arc<dyn VectorTileParser>) -> io::Result<Self> {
        let workers = (0..size.max(1))
            .map(|id| WorkerHandle::spawn(id, Arc::clone(&parser)).map(Arc::new))
            .collect::<io::Result<Vec<_>>>()?;
        debug!(size = workers.len(), "Worker pool started");

        Ok(Self {
            workers,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Returns the worker under the cursor and advances the cursor.
    pub fn next_worker(&self) -> Arc<WorkerHandle> {
        let len = self.workers.len();
        let index = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
        {
            Ok(prev) | Err(prev) => prev,
        };
        Arc::clone(&self.workers[index])
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Always false; the pool holds at least one worker.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// All workers in pool order.
    pub fn workers(&self) -> &[Arc<WorkerHandle>] {
        &self.workers
    }
}
