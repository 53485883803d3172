//! Media handling for the MJPEG relay
//!
//! This module provides:
//! - JPEG marker search and frame validation
//! - Frame reassembly from an unchunked byte stream
//! - Best-effort frame recompression

pub mod extractor;
pub mod marker;
pub mod transform;

pub use extractor::{ExtractorConfig, ExtractorStats, FrameExtractor};
pub use marker::{frame_info, is_jpeg_frame, validate_frame, FrameInfo, EOI, SOI};
pub use transform::{transform_for_quality, FrameTransform, JpegRecompressor, Passthrough};
