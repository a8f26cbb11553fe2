//! Raster tile decoding.
//!
//! Decoding is tried twice: first on the raw bytes with the format sniffed
//! from their magic number, then with the format named by the archive's
//! content type. Some payloads only decode on the second path.

use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};
use thiserror::Error;

/// A decoded, displayable tile image shared between the cache and tiles.
pub type Bitmap = Arc<RgbaImage>;

/// Errors from raster decode.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The bytes could not be decoded.
    #[error("{0}")]
    Image(String),

    /// No decoder is registered for the content type.
    #[error("Unknown content type '{0}'")]
    UnknownContentType(String),

    /// The decode task died.
    #[error("Decode task failed: {0}")]
    Task(String),
}

/// Which decode path produced a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    Direct,
    Typed,
}

/// Turns encoded tile bytes into RGBA pixels.
pub trait ImageDecoder: Send + Sync + 'static {
    /// Decodes bytes without being told their format.
    fn decode_raw(&self, bytes: &[u8]) -> Result<RgbaImage, DecodeError>;

    /// Decodes bytes as the format named by `content_type`.
    fn decode_typed(&self, bytes: &[u8], content_type: &str) -> Result<RgbaImage, DecodeError>;
}

/// [`ImageDecoder`] backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode_raw(&self, bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
        image::load_from_memory(bytes)
            .map(|img| img.to_rgba8())
            .map_err(|e| DecodeError::Image(e.to_string()))
    }

    fn decode_typed(&self, bytes: &[u8], content_type: &str) -> Result<RgbaImage, DecodeError> {
        let format = ImageFormat::from_mime_type(content_type)
            .ok_or_else(|| DecodeError::UnknownContentType(content_type.to_string()))?;
        image::load_from_memory_with_format(bytes, format)
            .map(|img| img.to_rgba8())
            .map_err(|e| DecodeError::Image(e.to_string()))
    }
}

/// Decodes `bytes`, falling back to the typed path when the direct one fails.
///
/// The returned error is the fallback's, since it is the last path tried.
pub fn decode_with_fallback(
    decoder: &dyn ImageDecoder,
    bytes: &[u8],
    content_type: &str,
) -> Result<(RgbaImage, DecodePath), DecodeError> {
    match decoder.decode_raw(bytes) {
        Ok(image) => Ok((image, DecodePath::Direct)),
        Err(_) => decoder
            .decode_typed(bytes, content_type)
            .map(|image| (image, DecodePath::Typed)),
    }
}

/// Runs [`decode_with_fallback`] on the blocking pool.
pub async fn decode_off_thread(
    decoder: Arc<dyn ImageDecoder>,
    bytes: bytes::Bytes,
    content_type: String,
) -> Result<(Bitmap, DecodePath), DecodeError> {
    tokio::task::spawn_blocking(move || {
        decode_with_fallback(decoder.as_ref(), &bytes, &content_type)
            .map(|(image, path)| (Arc::new(image), path))
    })
    .await
    .map_err(|e| DecodeError::Task(e.to_string()))?
}

/// Fully transparent square image used for tiles the archive does not have.
pub fn blank_bitmap(tile_size: u32) -> Bitmap {
    Arc::new(RgbaImage::from_pixel(
        tile_size,
        tile_size,
        Rgba([0, 0, 0, 0]),
    ))
}
