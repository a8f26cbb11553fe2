//! Renderer-facing tile objects.
//!
//! A [`Tile`] is a cheap, cloneable handle. The renderer keeps one per
//! visible tile and passes it to `load_tile`, `abort_tile` and
//! `unload_tile`; the pipelines record state, data and the assigned worker
//! on it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::coord::OverscaledTileId;
use crate::decode::Bitmap;
use crate::error::SourceResult;
use crate::worker::{ParsedVectorTile, WorkerHandle};

/// Load state of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Never loaded.
    Pending,
    /// A fetch is in flight.
    Loading,
    Loaded,
    Errored,
    /// Loaded data is past its expiry; the next load starts fresh.
    Expired,
    /// Destroyed by the renderer.
    Unloaded,
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Errored => "errored",
            Self::Expired => "expired",
            Self::Unloaded => "unloaded",
        };
        f.write_str(name)
    }
}

/// Data held by a loaded tile.
#[derive(Debug, Clone, Default)]
pub enum TileData {
    /// Nothing loaded, or the archive has no tile here.
    #[default]
    Empty,
    Vector(Arc<ParsedVectorTile>),
    Raster(Bitmap),
}

/// Result of a finished load, applied to the tile in one step.
pub(crate) enum LoadOutcome {
    Loaded {
        data: TileData,
        expires_at: Option<Instant>,
    },
    Errored,
    /// Aborted or cancelled: no data, no error.
    Dropped,
}

/// What a new load request should do.
pub(crate) enum LoadStart {
    /// The tile was aborted or destroyed; complete without doing anything.
    Aborted,
    /// Another load is in flight; wait for the reload it will run.
    Continuation(oneshot::Receiver<SourceResult<()>>),
    /// Start a load. Carries the worker to reuse, if any.
    Begin(Option<Arc<WorkerHandle>>),
}

type Continuation = oneshot::Sender<SourceResult<()>>;

struct TileSlot {
    state: TileState,
    data: TileData,
    worker: Option<Arc<WorkerHandle>>,
    expires_at: Option<Instant>,
    reload: Option<Continuation>,
}

struct TileInner {
    id: OverscaledTileId,
    is_symbol_tile: bool,
    cancel: CancellationToken,
    aborted: AtomicBool,
    destroyed: AtomicBool,
    slot: Mutex<TileSlot>,
}

/// Shared handle to one renderer tile.
#[derive(Clone)]
pub struct Tile {
    inner: Arc<TileInner>,
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl Tile {
    pub fn new(id: OverscaledTileId) -> Self {
        Self::build(id, false)
    }

    /// A tile whose layers include symbols.
    pub fn symbol(id: OverscaledTileId) -> Self {
        Self::build(id, true)
    }

    fn build(id: OverscaledTileId, is_symbol_tile: bool) -> Self {
        Self {
            inner: Arc::new(TileInner {
                id,
                is_symbol_tile,
                cancel: CancellationToken::new(),
                aborted: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                slot: Mutex::new(TileSlot {
                    state: TileState::Pending,
                    data: TileData::Empty,
                    worker: None,
                    expires_at: None,
                    reload: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> OverscaledTileId {
        self.inner.id
    }

    pub fn is_symbol_tile(&self) -> bool {
        self.inner.is_symbol_tile
    }

    pub fn state(&self) -> TileState {
        self.inner.slot.lock().state
    }

    pub fn data(&self) -> TileData {
        self.inner.slot.lock().data.clone()
    }

    /// Decoded image, for raster tiles.
    pub fn bitmap(&self) -> Option<Bitmap> {
        match &self.inner.slot.lock().data {
            TileData::Raster(bitmap) => Some(Arc::clone(bitmap)),
            _ => None,
        }
    }

    /// Parsed layers, for vector tiles.
    pub fn vector(&self) -> Option<Arc<ParsedVectorTile>> {
        match &self.inner.slot.lock().data {
            TileData::Vector(parsed) => Some(Arc::clone(parsed)),
            _ => None,
        }
    }

    /// Pool position of the worker that parses this tile.
    pub fn assigned_worker(&self) -> Option<usize> {
        self.inner.slot.lock().worker.as_ref().map(|w| w.id())
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.inner.slot.lock().expires_at
    }

    /// True once the tile's expiry instant has passed.
    pub fn is_expired(&self) -> bool {
        self.inner
            .slot
            .lock()
            .expires_at
            .is_some_and(|at| at <= Instant::now())
    }

    /// Moves a stale loaded tile to [`TileState::Expired`].
    ///
    /// Returns true if the state changed.
    pub fn mark_expired_if_stale(&self) -> bool {
        let mut slot = self.inner.slot.lock();
        let stale = slot.expires_at.is_some_and(|at| at <= Instant::now());
        if stale && slot.state == TileState::Loaded {
            slot.state = TileState::Expired;
            true
        } else {
            false
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Marks the tile aborted and cancels any in-flight request.
    ///
    /// Safe to call any number of times.
    pub fn abort(&self) {
        if !self.inner.aborted.swap(true, Ordering::AcqRel) {
            self.inner.cancel.cancel();
        }
    }

    /// Aborts the tile and releases its data. Safe to call any number of times.
    pub fn destroy(&self) {
        self.abort();
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut slot = self.inner.slot.lock();
        slot.state = TileState::Unloaded;
        slot.data = TileData::Empty;
        slot.worker = None;
        slot.expires_at = None;
        // Waiters see a closed channel and complete quietly.
        slot.reload = None;
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Decides how a load request proceeds and marks the tile loading.
    ///
    /// When a load is already in flight the request becomes the tile's
    /// reload continuation. A newer continuation replaces an older one,
    /// which resolves at once.
    pub(crate) fn start_load(&self) -> LoadStart {
        if self.is_aborted() {
            return LoadStart::Aborted;
        }

        let mut slot = self.inner.slot.lock();
        match slot.state {
            TileState::Unloaded => LoadStart::Aborted,
            TileState::Loading => {
                let (tx, rx) = oneshot::channel();
                if let Some(superseded) = slot.reload.replace(tx) {
                    let _ = superseded.send(Ok(()));
                }
                LoadStart::Continuation(rx)
            }
            TileState::Expired | TileState::Pending => {
                slot.state = TileState::Loading;
                slot.worker = None;
                LoadStart::Begin(None)
            }
            TileState::Loaded | TileState::Errored => {
                slot.state = TileState::Loading;
                LoadStart::Begin(slot.worker.clone())
            }
        }
    }

    pub(crate) fn assign_worker(&self, worker: Arc<WorkerHandle>) {
        self.inner.slot.lock().worker = Some(worker);
    }

    /// Applies a finished load and takes any pending continuation.
    pub(crate) fn finish_load(&self, outcome: LoadOutcome) -> Option<Continuation> {
        let mut slot = self.inner.slot.lock();
        if slot.state == TileState::Unloaded {
            return None;
        }
        match outcome {
            LoadOutcome::Loaded { data, expires_at } => {
                slot.state = TileState::Loaded;
                slot.data = data;
                slot.expires_at = expires_at;
            }
            LoadOutcome::Errored => slot.state = TileState::Errored,
            LoadOutcome::Dropped => {
                slot.state = match slot.data {
                    TileData::Empty => TileState::Pending,
                    _ => TileState::Loaded,
                }
            }
        }
        slot.reload.take()
    }
}
