//! Built-in Mapbox Vector Tile parser.

use std::io::Read;

use flate2::read::GzDecoder;
use geozero::mvt::{Message, Tile};

use super::{ParseError, ParsedVectorTile, VectorLayerSummary, VectorTileParser, VectorTileRequest};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const DEFAULT_EXTENT: u32 = 4096;

/// Decodes MVT protobufs into per-layer summaries.
///
/// Payloads that still carry a gzip wrapper are inflated first.
#[derive(Debug, Default, Clone, Copy)]
pub struct MvtParser;

impl VectorTileParser for MvtParser {
    fn parse(
        &self,
        request: &VectorTileRequest,
        payload: &[u8],
    ) -> Result<ParsedVectorTile, ParseError> {
        let inflated;
        let bytes = if payload.starts_with(&GZIP_MAGIC) {
            let mut out = Vec::with_capacity(payload.len() * 4);
            GzDecoder::new(payload)
                .read_to_end(&mut out)
                .map_err(|e| ParseError::Compression(e.to_string()))?;
            inflated = out;
            inflated.as_slice()
        } else {
            payload
        };

        let tile = Tile::decode(bytes).map_err(|e| ParseError::Malformed(e.to_string()))?;

        let layers = tile
            .layers
            .iter()
            .map(|layer| {
                let promoted_key = request
                    .promote_id
                    .as_ref()
                    .and_then(|p| p.property_for(&layer.name))
                    .and_then(|name| layer.keys.iter().position(|k| k == name))
                    .map(|idx| idx as u32);

                let promoted_ids = match promoted_key {
                    // Tags are (key, value) index pairs
                    Some(key) => layer
                        .features
                        .iter()
                        .filter(|f| f.tags.chunks(2).any(|pair| pair[0] == key))
                        .count(),
                    None => 0,
                };

                VectorLayerSummary {
                    name: layer.name.clone(),
                    version: layer.version,
                    extent: layer.extent.unwrap_or(DEFAULT_EXTENT),
                    feature_count: layer.features.len(),
                    promoted_ids,
                }
            })
            .collect();

        Ok(ParsedVectorTile {
            tile_id: request.tile_id.canonical,
            layers,
            payload_bytes: payload.len(),
        })
    }
}
