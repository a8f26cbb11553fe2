//! Archive tile source: the per-layer object a renderer talks to.
//!
//! Lifecycle:
//!
//! ```text
//! constructed --load()--> loading --+--> loaded
//!                                   +--> errored
//! ```
//!
//! Construction registers the source's URL with the registry, reusing any
//! open connection. `load` reads header and metadata (from the registry's
//! cache when another layer already read them), derives zoom range, bounds
//! and tile kind, and selects the pipeline that serves `load_tile`.

mod events;
mod kind;

pub use events::{DataKind, SourceEvent};
pub use kind::TileKind;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::archive::ArchiveHeader;
use crate::bounds::{LngLatBounds, TileBounds};
use crate::config::SourceOptions;
use crate::coord::CanonicalTileId;
use crate::decode::{ImageCrateDecoder, ImageDecoder};
use crate::error::{SourceError, SourceResult};
use crate::pipeline::{PipelineContext, RasterPipeline, TilePipeline, VectorPipeline};
use crate::registry::{ArchiveConnection, SharedResourceRegistry};
use crate::tile::Tile;
use crate::worker::{MvtParser, VectorTileParser};

const EVENT_CAPACITY: usize = 64;

/// Where a source is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePhase {
    Constructed,
    Loading,
    Loaded,
    Errored,
}

struct SourceState {
    phase: SourcePhase,
    header: Option<ArchiveHeader>,
    metadata: Option<Arc<serde_json::Value>>,
    min_zoom: u8,
    max_zoom: u8,
    bounds: Option<TileBounds>,
    kind: Option<TileKind>,
    content_type: Option<String>,
    pipeline: Option<TilePipeline>,
}

/// Tile source backed by a single-file tile archive.
pub struct ArchiveTileSource {
    id: String,
    options: SourceOptions,
    registry: Arc<SharedResourceRegistry>,
    connection: Arc<ArchiveConnection>,
    parser: Arc<dyn VectorTileParser>,
    decoder: Arc<dyn ImageDecoder>,
    events: broadcast::Sender<SourceEvent>,
    state: RwLock<SourceState>,
}

impl ArchiveTileSource {
    /// Creates a source and registers its URL with `registry`.
    pub fn new(
        id: impl Into<String>,
        options: SourceOptions,
        registry: Arc<SharedResourceRegistry>,
    ) -> Self {
        let connection = registry.get_connection(&options.url);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = SourceState {
            phase: SourcePhase::Constructed,
            header: None,
            metadata: None,
            min_zoom: options.min_zoom,
            max_zoom: options.max_zoom,
            bounds: None,
            kind: None,
            content_type: None,
            pipeline: None,
        };

        Self {
            id: id.into(),
            options,
            registry,
            connection,
            parser: Arc::new(MvtParser),
            decoder: Arc::new(ImageCrateDecoder),
            events,
            state: RwLock::new(state),
        }
    }

    /// Parser used to start the worker pool, if this is the first vector
    /// source. Later sources share the existing pool.
    pub fn with_parser(mut self, parser: Arc<dyn VectorTileParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Decoder for raster tiles.
    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.options.url
    }

    pub fn options(&self) -> &SourceOptions {
        &self.options
    }

    pub fn connection(&self) -> &Arc<ArchiveConnection> {
        &self.connection
    }

    /// Receives every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> SourcePhase {
        self.state.read().phase
    }

    /// True once `load` has completed successfully.
    pub fn loaded(&self) -> bool {
        self.phase() == SourcePhase::Loaded
    }

    pub fn tile_kind(&self) -> Option<TileKind> {
        self.state.read().kind
    }

    pub fn content_type(&self) -> Option<String> {
        self.state.read().content_type.clone()
    }

    pub fn min_zoom(&self) -> u8 {
        self.state.read().min_zoom
    }

    pub fn max_zoom(&self) -> u8 {
        self.state.read().max_zoom
    }

    /// Declared extent, when the archive declares one with its zoom range.
    pub fn bounds(&self) -> Option<LngLatBounds> {
        self.state.read().bounds.as_ref().map(|b| *b.bounds())
    }

    pub fn header(&self) -> Option<ArchiveHeader> {
        self.state.read().header.clone()
    }

    pub fn metadata(&self) -> Option<Arc<serde_json::Value>> {
        self.state.read().metadata.clone()
    }

    /// Reads header and metadata and prepares the source to serve tiles.
    ///
    /// Fails, with an error event, only when header or metadata cannot be
    /// read. An unsupported tile type is reported as an error event but
    /// `load` still completes; tile loads then fail.
    pub async fn load(&self) -> SourceResult<()> {
        self.state.write().phase = SourcePhase::Loading;
        self.emit(SourceEvent::DataLoading {
            source_id: self.id.clone(),
        });

        let (header, metadata) = match self.read_archive_info().await {
            Ok(info) => info,
            Err(e) => {
                error!(source = %self.id, url = %self.options.url, error = %e, "Failed to load archive metadata");
                self.state.write().phase = SourcePhase::Errored;
                self.emit_error(e.clone(), None);
                return Err(e);
            }
        };

        let (min_zoom, max_zoom) = header
            .zoom_range()
            .unwrap_or((self.options.min_zoom, self.options.max_zoom));
        let bounds = match (header.bounds(), header.zoom_range()) {
            (Some(extent), Some((lo, hi))) => Some(TileBounds::new(extent, lo, hi)),
            _ => None,
        };
        let kind = TileKind::from(header.tile_type);
        let content_type = header.tile_type.content_type().map(str::to_string);

        let pipeline = match self.build_pipeline(kind, content_type.clone().unwrap_or_default()) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                self.state.write().phase = SourcePhase::Errored;
                self.emit_error(e.clone(), None);
                return Err(e);
            }
        };

        info!(
            source = %self.id,
            url = %self.options.url,
            kind = %kind,
            min_zoom,
            max_zoom,
            bounded = bounds.is_some(),
            "Tile source loaded"
        );

        {
            let mut state = self.state.write();
            state.phase = SourcePhase::Loaded;
            state.min_zoom = min_zoom;
            state.max_zoom = max_zoom;
            state.bounds = bounds;
            state.kind = Some(kind);
            state.content_type = content_type;
            state.pipeline = pipeline;
            state.header = Some(header.clone());
            state.metadata = Some(metadata);
        }

        if kind == TileKind::Unsupported {
            self.emit_error(self.unsupported(&header), None);
            return Ok(());
        }

        self.emit(SourceEvent::Data {
            source_id: self.id.clone(),
            kind: DataKind::Metadata,
        });
        self.emit(SourceEvent::Data {
            source_id: self.id.clone(),
            kind: DataKind::Content,
        });
        Ok(())
    }

    /// True if `tile` may exist: always when no bounds are known.
    pub fn has_tile(&self, tile: &CanonicalTileId) -> bool {
        match &self.state.read().bounds {
            Some(bounds) => bounds.contains(tile),
            None => true,
        }
    }

    /// Loads `tile` through the source's pipeline.
    ///
    /// Cancellation never surfaces: an aborted tile completes with `Ok(())`
    /// and no data. Other failures are also sent as error events.
    pub async fn load_tile(&self, tile: &Tile) -> SourceResult<()> {
        let pipeline = {
            let state = self.state.read();
            if state.phase != SourcePhase::Loaded {
                return Err(SourceError::NotLoaded {
                    source_id: self.id.clone(),
                });
            }
            match &state.pipeline {
                Some(pipeline) => pipeline.clone(),
                None => {
                    let tile_type = state
                        .header
                        .as_ref()
                        .map(|h| h.tile_type)
                        .unwrap_or(crate::archive::ArchiveTileType::Unknown);
                    return Err(SourceError::UnsupportedTileKind {
                        source_id: self.id.clone(),
                        tile_type,
                    });
                }
            }
        };

        if tile.mark_expired_if_stale() {
            debug!(source = %self.id, tile = %tile.id(), "Tile expired");
        }

        match pipeline.load_tile(tile).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancellation() => Ok(()),
            Err(e) => {
                self.emit_error(e.clone(), Some(format!("tile {}", tile.id())));
                Err(e)
            }
        }
    }

    /// Cancels any in-flight request for `tile`.
    pub fn abort_tile(&self, tile: &Tile) {
        tile.abort();
    }

    /// Aborts `tile` and releases its data. Shared caches are untouched.
    pub fn unload_tile(&self, tile: &Tile) {
        tile.destroy();
    }

    /// Header and metadata, shared through the registry. Sources loading
    /// the same URL at the same time wait on a single read of each.
    async fn read_archive_info(
        &self,
    ) -> SourceResult<(ArchiveHeader, Arc<serde_json::Value>)> {
        let url = &self.options.url;
        let archive = self.connection.archive().as_ref();
        let (header, metadata) = futures::try_join!(
            self.registry.header_or_fetch(url, archive),
            self.registry.metadata_or_fetch(url, archive),
        )?;
        debug!(source = %self.id, url = %url, "Archive metadata ready");
        Ok((header, metadata))
    }

    fn build_pipeline(
        &self,
        kind: TileKind,
        content_type: String,
    ) -> SourceResult<Option<TilePipeline>> {
        if kind == TileKind::Unsupported {
            return Ok(None);
        }

        let ctx = Arc::new(PipelineContext {
            source_id: self.id.clone(),
            options: self.options.clone(),
            content_type,
            registry: Arc::clone(&self.registry),
            connection: Arc::clone(&self.connection),
        });

        if kind.is_vector() {
            self.registry.ensure_worker_pool(Arc::clone(&self.parser))?;
            Ok(Some(TilePipeline::Vector(VectorPipeline::new(ctx))))
        } else {
            Ok(Some(TilePipeline::Raster(RasterPipeline::new(
                ctx,
                Arc::clone(&self.decoder),
            ))))
        }
    }

    fn unsupported(&self, header: &ArchiveHeader) -> SourceError {
        SourceError::UnsupportedTileKind {
            source_id: self.id.clone(),
            tile_type: header.tile_type,
        }
    }

    fn emit(&self, event: SourceEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_error(&self, error: SourceError, context: Option<String>) {
        self.emit(SourceEvent::Error {
            source_id: self.id.clone(),
            error,
            context,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveError, ArchiveTileType, MemoryArchive, MemoryArchiveOpener};
    use crate::config::RegistryConfig;
    use crate::coord::OverscaledTileId;
    use crate::tile::TileState;
    use crate::worker::tests::EchoParser;

    fn registry(archives: Vec<MemoryArchive>) -> Arc<SharedResourceRegistry> {
        let opener = archives
            .into_iter()
            .fold(MemoryArchiveOpener::new(), |o, a| o.with_archive(Arc::new(a)));
        Arc::new(SharedResourceRegistry::new(
            RegistryConfig::default().with_worker_pool_size(2),
            Arc::new(opener),
        ))
    }

    fn drain(rx: &mut broadcast::Receiver<SourceEvent>) -> Vec<SourceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn vector_archive() -> MemoryArchive {
        MemoryArchive::new(
            "mem://v",
            ArchiveHeader::new(ArchiveTileType::Mvt)
                .with_zoom_range(0, 14)
                .with_bounds([-10.0, -10.0, 10.0, 10.0]),
        )
        .with_metadata(serde_json::json!({"name": "roads"}))
        .with_tile(CanonicalTileId::new(0, 0, 0), b"tile".to_vec())
    }

    #[tokio::test]
    async fn test_load_emits_events_and_derives_state() {
        let source = ArchiveTileSource::new(
            "roads",
            SourceOptions::new("mem://v"),
            registry(vec![vector_archive()]),
        )
        .with_parser(Arc::new(EchoParser));
        let mut rx = source.subscribe();
        assert_eq!(source.phase(), SourcePhase::Constructed);

        source.load().await.unwrap();

        assert!(source.loaded());
        assert_eq!(source.tile_kind(), Some(TileKind::Vector));
        assert_eq!(
            source.content_type().as_deref(),
            Some("application/vnd.mapbox-vector-tile")
        );
        assert_eq!((source.min_zoom(), source.max_zoom()), (0, 14));
        assert_eq!(
            source.bounds().unwrap().to_array(),
            [-10.0, -10.0, 10.0, 10.0]
        );
        assert_eq!(source.metadata().unwrap()["name"], "roads");

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                SourceEvent::DataLoading {
                    source_id: "roads".into()
                },
                SourceEvent::Data {
                    source_id: "roads".into(),
                    kind: DataKind::Metadata
                },
                SourceEvent::Data {
                    source_id: "roads".into(),
                    kind: DataKind::Content
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_has_tile_uses_bounds() {
        let source = ArchiveTileSource::new(
            "roads",
            SourceOptions::new("mem://v"),
            registry(vec![vector_archive()]),
        )
        .with_parser(Arc::new(EchoParser));

        // Before load nothing is known, so everything may exist.
        assert!(source.has_tile(&CanonicalTileId::new(0, 1, 0)));

        source.load().await.unwrap();
        assert!(source.has_tile(&CanonicalTileId::new(0, 0, 0)));
        assert!(!source.has_tile(&CanonicalTileId::new(0, 1, 0)));
        assert!(source.has_tile(&CanonicalTileId::new(2, 1, 1)));
        assert!(!source.has_tile(&CanonicalTileId::new(2, 0, 1)));
        assert!(!source.has_tile(&CanonicalTileId::new(2, 3, 3)));
    }

    #[tokio::test]
    async fn test_missing_bounds_disables_filter() {
        let archive = MemoryArchive::new(
            "mem://open",
            ArchiveHeader::new(ArchiveTileType::Png).with_bounds([-10.0, -10.0, 10.0, 10.0]),
        );
        let source = ArchiveTileSource::new(
            "open",
            SourceOptions::new("mem://open").with_zoom_range(2, 9),
            registry(vec![archive]),
        );
        source.load().await.unwrap();

        assert!(source.bounds().is_none());
        assert!(source.has_tile(&CanonicalTileId::new(3, 7, 7)));
        assert_eq!((source.min_zoom(), source.max_zoom()), (2, 9));
    }

    #[tokio::test]
    async fn test_metadata_failure_errors_source() {
        let archive = vector_archive().with_header_error(ArchiveError::Io("truncated".into()));
        let source = ArchiveTileSource::new(
            "roads",
            SourceOptions::new("mem://v"),
            registry(vec![archive]),
        );
        let mut rx = source.subscribe();

        let err = source.load().await.unwrap_err();
        assert_eq!(err, SourceError::Archive(ArchiveError::Io("truncated".into())));
        assert_eq!(source.phase(), SourcePhase::Errored);
        assert!(!source.loaded());

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(SourceEvent::Error { error, .. }) if *error == err));

        let tile = Tile::new(OverscaledTileId::from_canonical(CanonicalTileId::new(0, 0, 0)));
        assert!(matches!(
            source.load_tile(&tile).await,
            Err(SourceError::NotLoaded { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_kind_reported_once() {
        let archive = MemoryArchive::new(
            "mem://odd",
            ArchiveHeader::new(ArchiveTileType::Unknown).with_zoom_range(0, 5),
        );
        let source = ArchiveTileSource::new(
            "odd",
            SourceOptions::new("mem://odd"),
            registry(vec![archive]),
        );
        let mut rx = source.subscribe();

        source.load().await.unwrap();
        assert_eq!(source.tile_kind(), Some(TileKind::Unsupported));
        assert_eq!(source.max_zoom(), 5);

        let events = drain(&mut rx);
        let errors: Vec<_> = events.iter().filter(|e| e.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SourceEvent::Data { .. })));

        let tile = Tile::new(OverscaledTileId::from_canonical(CanonicalTileId::new(0, 0, 0)));
        assert!(matches!(
            source.load_tile(&tile).await,
            Err(SourceError::UnsupportedTileKind { .. })
        ));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_load_tile_and_unload() {
        let source = ArchiveTileSource::new(
            "roads",
            SourceOptions::new("mem://v"),
            registry(vec![vector_archive()]),
        )
        .with_parser(Arc::new(EchoParser));
        source.load().await.unwrap();

        let tile = Tile::new(OverscaledTileId::from_canonical(CanonicalTileId::new(0, 0, 0)));
        source.load_tile(&tile).await.unwrap();
        assert_eq!(tile.state(), TileState::Loaded);
        assert_eq!(tile.vector().unwrap().feature_count(), 4);

        source.unload_tile(&tile);
        source.unload_tile(&tile);
        assert_eq!(tile.state(), TileState::Unloaded);

        // Unloaded tiles complete quietly.
        source.load_tile(&tile).await.unwrap();
        assert!(tile.vector().is_none());
    }

    #[tokio::test]
    async fn test_tile_error_emits_event_with_context() {
        let bad = CanonicalTileId::new(1, 0, 0);
        let archive = vector_archive().with_tile_error(bad, ArchiveError::Format("corrupt".into()));
        let source = ArchiveTileSource::new(
            "roads",
            SourceOptions::new("mem://v"),
            registry(vec![archive]),
        )
        .with_parser(Arc::new(EchoParser));
        source.load().await.unwrap();
        let mut rx = source.subscribe();

        let tile = Tile::new(OverscaledTileId::from_canonical(bad));
        assert!(source.load_tile(&tile).await.is_err());

        match drain(&mut rx).as_slice() {
            [SourceEvent::Error {
                source_id, context, ..
            }] => {
                assert_eq!(source_id, "roads");
                assert_eq!(context.as_deref(), Some("tile 1/0/0@1"));
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }
}
