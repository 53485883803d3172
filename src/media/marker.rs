//! JPEG frame markers
//!
//! An MJPEG pipe is a plain concatenation of JPEG images. Each image starts
//! with SOI and ends with EOI:
//!
//! ```text
//! +--------+---------------------------------+--------+
//! | FF D8  | segments + entropy-coded data   | FF D9  |
//! |  SOI   |                                 |  EOI   |
//! +--------+---------------------------------+--------+
//! ```
//!
//! Inside entropy-coded data every `FF` byte is stuffed with a following `00`,
//! so `FF D9` only appears as the real end of image.

use image::ImageFormat;

/// Start of image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End of image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Length of either marker in bytes
pub const MARKER_LEN: usize = 2;

/// Find the first occurrence of `marker` in `haystack` at or after `from`
///
/// Returns the absolute index of the first marker byte.
pub fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    let last = haystack.len().checked_sub(1)?;
    let mut pos = from;

    // Skip to each candidate first byte, then check the byte after it
    while pos < last {
        let at = pos + haystack[pos..last].iter().position(|&b| b == marker[0])?;
        if haystack[at + 1] == marker[1] {
            return Some(at);
        }
        pos = at + 1;
    }

    None
}

/// Cheap check that `data` is delimited by SOI and EOI
///
/// Does not decode anything.
pub fn is_jpeg_frame(data: &[u8]) -> bool {
    data.len() >= 2 * MARKER_LEN && data.starts_with(&SOI) && data.ends_with(&EOI)
}

/// Check markers and fully decode the frame
pub fn validate_frame(data: &[u8]) -> bool {
    is_jpeg_frame(data) && image::load_from_memory_with_format(data, ImageFormat::Jpeg).is_ok()
}

/// Basic information about a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// Image width in pixels (0 if the frame is not decodable)
    pub width: u32,
    /// Image height in pixels (0 if the frame is not decodable)
    pub height: u32,
    /// Encoded size in bytes
    pub size: usize,
}

/// Decode a frame and report its dimensions
///
/// Width and height are zero when the frame is not a valid JPEG; the size is
/// always reported.
pub fn frame_info(data: &[u8]) -> FrameInfo {
    let size = data.len();
    if !is_jpeg_frame(data) {
        return FrameInfo {
            size,
            ..Default::default()
        };
    }

    match image::load_from_memory_with_format(data, ImageFormat::Jpeg) {
        Ok(img) => FrameInfo {
            width: img.width(),
            height: img.height(),
            size,
        },
        Err(_) => FrameInfo {
            size,
            ..Default::default()
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use image::codecs::jpeg::JpegEncoder;
    use image::{ExtendedColorType, ImageEncoder, RgbImage};

    /// Encode a small gradient as a real JPEG
    pub(crate) fn encode_test_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn test_find_marker() {
        let data = [0x00, 0xFF, 0xD8, 0x01, 0xFF, 0xD9];
        assert_eq!(find_marker(&data, SOI, 0), Some(1));
        assert_eq!(find_marker(&data, EOI, 0), Some(4));
        assert_eq!(find_marker(&data, SOI, 2), None);
        assert_eq!(find_marker(&data, EOI, 5), None);
        assert_eq!(find_marker(&data, EOI, 100), None);
    }

    #[test]
    fn test_find_marker_in_marker_heavy_data() {
        let data = [0xFF, 0xFF, 0xD9, 0x00, 0xFF, 0xD8, 0xFF, 0xFF, 0xFF, 0xD9, 0xFF];
        let expected = |marker: [u8; 2], from: usize| {
            (from..data.len().saturating_sub(1)).find(|&i| data[i] == marker[0] && data[i + 1] == marker[1])
        };

        for from in 0..=data.len() + 1 {
            assert_eq!(find_marker(&data, SOI, from), expected(SOI, from), "SOI from {}", from);
            assert_eq!(find_marker(&data, EOI, from), expected(EOI, from), "EOI from {}", from);
        }
        assert_eq!(find_marker(&[], EOI, 0), None);
        assert_eq!(find_marker(&[0xFF], EOI, 0), None);
    }

    #[test]
    fn test_find_marker_lone_ff() {
        // FF followed by a non-marker byte must not match
        let data = [0xFF, 0x00, 0xFF, 0xFF, 0xD8];
        assert_eq!(find_marker(&data, SOI, 0), Some(3));
    }

    #[test]
    fn test_is_jpeg_frame() {
        assert!(is_jpeg_frame(&[0xFF, 0xD8, 0xFF, 0xD9]));
        assert!(is_jpeg_frame(&[0xFF, 0xD8, 0x42, 0xFF, 0xD9]));
        assert!(!is_jpeg_frame(&[0xFF, 0xD8, 0xD9]));
        assert!(!is_jpeg_frame(&[0x00, 0xD8, 0xFF, 0xD9]));
        assert!(!is_jpeg_frame(&[]));
    }

    #[test]
    fn test_validate_frame() {
        let jpeg = encode_test_jpeg(16, 8, 90);
        assert!(validate_frame(&jpeg));

        // Markers present but body garbage
        assert!(!validate_frame(&[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]));
    }

    #[test]
    fn test_frame_info() {
        let jpeg = encode_test_jpeg(32, 24, 80);
        let info = frame_info(&jpeg);
        assert_eq!(info.width, 32);
        assert_eq!(info.height, 24);
        assert_eq!(info.size, jpeg.len());

        let info = frame_info(b"not a jpeg");
        assert_eq!(info, FrameInfo { width: 0, height: 0, size: 10 });
    }
}
