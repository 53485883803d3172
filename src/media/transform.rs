//! Frame transform stage
//!
//! Recompresses extracted frames at a lower JPEG quality before they are
//! broadcast. Transformation is strictly best-effort: a frame that is not a
//! JPEG, or that fails to decode or encode, is passed through unchanged.
//!
//! Transforms are stateless and `Send + Sync`, so the pipeline runs several
//! of them in parallel on blocking worker threads while keeping output order.

use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

use super::marker::is_jpeg_frame;
use crate::error::TransformError;
use crate::registry::Frame;

/// A per-frame transformation
pub trait FrameTransform: Send + Sync + 'static {
    /// Transform one frame, reporting failure
    fn try_transform(&self, frame: &Frame) -> Result<Frame, TransformError>;

    /// Transform one frame, returning the input unchanged on failure
    fn transform(&self, frame: Frame) -> Frame {
        match self.try_transform(&frame) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(error = %e, size = frame.len(), "Transform failed, passing frame through");
                frame
            }
        }
    }
}

/// Transform that returns every frame untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl FrameTransform for Passthrough {
    fn try_transform(&self, frame: &Frame) -> Result<Frame, TransformError> {
        Ok(frame.clone())
    }
}

/// Decodes each frame and re-encodes it at a fixed JPEG quality
#[derive(Debug, Clone, Copy)]
pub struct JpegRecompressor {
    quality: u8,
}

impl JpegRecompressor {
    /// Create a recompressor; quality is clamped to 1..=100
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Configured quality
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Recompress raw JPEG bytes
    pub fn recompress(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        if !is_jpeg_frame(data) {
            return Err(TransformError::NotJpeg);
        }

        let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(TransformError::Decode)?;
        let rgb = img.to_rgb8();

        let mut out = Vec::with_capacity(data.len() / 2);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(TransformError::Encode)?;

        Ok(out)
    }
}

impl FrameTransform for JpegRecompressor {
    fn try_transform(&self, frame: &Frame) -> Result<Frame, TransformError> {
        let out = self.recompress(frame.data())?;
        tracing::trace!(before = frame.len(), after = out.len(), "Frame recompressed");
        Ok(Frame::new(Bytes::from(out)))
    }
}

/// Build the transform for an optional quality setting
///
/// `None` disables recompression.
pub fn transform_for_quality(quality: Option<u8>) -> Arc<dyn FrameTransform> {
    match quality {
        Some(q) => Arc::new(JpegRecompressor::new(q)),
        None => Arc::new(Passthrough),
    }
}
