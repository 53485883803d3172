//! Frame extractor
//!
//! Reassembles complete JPEG frames from an unchunked byte stream. Reads from
//! the transcoder pipe do not line up with frame boundaries: one read may hold
//! a partial frame, exactly one frame, or several frames plus the start of the
//! next one.
//!
//! ```text
//!   read 1          read 2                 read 3
//! |--garbage--FFD8 ...|... FFD9 FFD8 ... FFD9 FFD8 ..|.. FFD9|
//!             \____ frame 1 __/ \__ frame 2 __/ \_ frame 3 _/
//! ```
//!
//! The accumulation buffer is owned exclusively by the extractor and is
//! bounded by two caps: when no start marker is present and the buffer grows
//! past `garbage_cap`, the oldest half is discarded; when the buffer grows past
//! `hard_cap` regardless (a start marker whose end never arrives), it is reset.

use bytes::{Buf, BytesMut};

use super::marker::{find_marker, EOI, MARKER_LEN, SOI};
use crate::registry::Frame;

/// Extractor buffer limits
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Buffer size above which markerless data is halved
    pub garbage_cap: usize,

    /// Buffer size above which the buffer is reset
    pub hard_cap: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            garbage_cap: 1024 * 1024,  // 1MB
            hard_cap: 5 * 1024 * 1024, // 5MB
        }
    }
}

impl ExtractorConfig {
    /// Set the markerless-data cap
    pub fn garbage_cap(mut self, cap: usize) -> Self {
        self.garbage_cap = cap;
        self
    }

    /// Set the absolute buffer cap
    pub fn hard_cap(mut self, cap: usize) -> Self {
        self.hard_cap = cap;
        self
    }
}

/// Counters kept by the extractor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractorStats {
    /// Total bytes fed
    pub bytes_fed: u64,
    /// Frames emitted
    pub frames: u64,
    /// Bytes discarded as garbage (before a start marker, or halved away)
    pub bytes_discarded: u64,
    /// Times the buffer was reset because it passed the hard cap
    pub overflow_resets: u64,
}

/// Stateful MJPEG frame extractor
#[derive(Debug)]
pub struct FrameExtractor {
    config: ExtractorConfig,
    buffer: BytesMut,
    /// Where the end-marker search resumes within the anchored frame
    scan_from: usize,
    stats: ExtractorStats,
}

impl FrameExtractor {
    /// Create an extractor with default caps
    pub fn new() -> Self {
        Self::with_config(ExtractorConfig::default())
    }

    /// Create an extractor with custom caps
    ///
    /// `garbage_cap` is clamped to `hard_cap`.
    pub fn with_config(mut config: ExtractorConfig) -> Self {
        config.garbage_cap = config.garbage_cap.min(config.hard_cap);
        Self {
            config,
            buffer: BytesMut::new(),
            scan_from: MARKER_LEN,
            stats: ExtractorStats::default(),
        }
    }

    /// Feed a chunk and collect every frame it completes
    ///
    /// Never blocks and never fails. Returns zero, one or many frames in
    /// stream order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.stats.bytes_fed += chunk.len() as u64;
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();

        loop {
            let Some(start) = find_marker(&self.buffer, SOI, 0) else {
                if self.buffer.len() > self.config.garbage_cap {
                    let half = self.buffer.len() / 2;
                    self.buffer.advance(half);
                    self.stats.bytes_discarded += half as u64;
                    tracing::debug!(discarded = half, "No start marker, discarding oldest half");
                }
                break;
            };

            // Keep the buffer anchored on the start marker
            if start > 0 {
                self.buffer.advance(start);
                self.stats.bytes_discarded += start as u64;
                self.scan_from = MARKER_LEN;
            }

            let Some(end) = find_marker(&self.buffer, EOI, self.scan_from) else {
                // Back off one byte so an end marker split across reads is found
                self.scan_from = self.buffer.len().saturating_sub(1).max(MARKER_LEN);
                break;
            };

            self.scan_from = MARKER_LEN;
            let frame = self.buffer.split_to(end + MARKER_LEN).freeze();
            self.stats.frames += 1;
            frames.push(Frame::new(frame));
        }

        if self.buffer.len() > self.config.hard_cap {
            tracing::warn!(
                buffered = self.buffer.len(),
                hard_cap = self.config.hard_cap,
                "Extractor buffer too large, resetting"
            );
            self.stats.bytes_discarded += self.buffer.len() as u64;
            self.stats.overflow_resets += 1;
            self.buffer.clear();
            self.scan_from = MARKER_LEN;
        }

        frames
    }

    /// Number of bytes currently held back waiting for more data
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Extractor counters
    pub fn stats(&self) -> ExtractorStats {
        self.stats
    }

    /// End of stream: drop whatever is buffered
    ///
    /// A trailing partial frame is never emitted. Returns the number of bytes
    /// that were discarded.
    pub fn finish(mut self) -> usize {
        let remaining = self.buffer.len();
        self.buffer.clear();
        remaining
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(body_len: usize, fill: u8) -> Vec<u8> {
        let mut data = Vec::with_capacity(body_len + 4);
        data.extend_from_slice(&SOI);
        data.extend(std::iter::repeat(fill).take(body_len));
        data.extend_from_slice(&EOI);
        data
    }

    fn feed_in_chunks(extractor: &mut FrameExtractor, data: &[u8], chunk: usize) -> Vec<Frame> {
        data.chunks(chunk).flat_map(|c| extractor.feed(c)).collect()
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let mut data = make_frame(100, 0x11);
        data.extend(make_frame(50, 0x22));

        let mut extractor = FrameExtractor::new();
        let frames = extractor.feed(&data);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 104);
        assert_eq!(frames[1].len(), 54);
        assert_eq!(frames[0].data()[2], 0x11);
        assert_eq!(frames[1].data()[2], 0x22);
        assert_eq!(extractor.buffered_len(), 0);
    }

    #[test]
    fn test_frame_split_across_feeds() {
        let data = make_frame(40, 0x33);
        let mut extractor = FrameExtractor::new();

        // Every call except the one carrying the final EOI byte yields nothing
        for (i, byte) in data.iter().enumerate() {
            let frames = extractor.feed(std::slice::from_ref(byte));
            if i + 1 < data.len() {
                assert!(frames.is_empty(), "frame emitted early at byte {}", i);
            } else {
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0].data().as_ref(), data.as_slice());
            }
        }
    }

    #[test]
    fn test_end_search_resumes_across_feeds() {
        let mut extractor = FrameExtractor::new();
        let mut data = make_frame(64 * 1024, 0x44);
        data.extend(make_frame(10, 0x55));

        let chunks: Vec<_> = data.chunks(4096).collect();
        let mut frames = Vec::new();
        for chunk in &chunks[..chunks.len() - 1] {
            frames.extend(extractor.feed(chunk));
            if frames.is_empty() {
                // Only the trailing byte is searched again next time
                assert_eq!(extractor.scan_from, extractor.buffered_len() - 1);
            }
        }
        frames.extend(extractor.feed(chunks[chunks.len() - 1]));

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 64 * 1024 + 4);
        assert_eq!(frames[1].data()[2], 0x55);
        assert_eq!(extractor.scan_from, MARKER_LEN);
    }

    #[test]
    fn test_small_hard_cap_keeps_halving_garbage() {
        let config = ExtractorConfig::default().hard_cap(1000);
        let mut extractor = FrameExtractor::with_config(config);
        assert_eq!(extractor.config.garbage_cap, 1000);

        // Markerless data is halved rather than reset
        extractor.feed(&[0x00; 1500]);
        assert_eq!(extractor.buffered_len(), 750);
        assert_eq!(extractor.stats().overflow_resets, 0);

        let frame = make_frame(20, 0x77);
        let frames = extractor.feed(&frame);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data().as_ref(), frame.as_slice());
    }

    #[test]
    fn test_end_marker_split_between_feeds() {
        let data = make_frame(30, 0x66);
        let (head, tail) = data.split_at(data.len() - 1);

        let mut extractor = FrameExtractor::new();
        assert!(extractor.feed(head).is_empty());
        let frames = extractor.feed(tail);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data().as_ref(), data.as_slice());
    }

    #[test]
    fn test_frames_exact_for_any_chunk_size() {
        let mut stream = vec![0x00, 0x12, 0xFF];
        let originals = [make_frame(10, 0x01), make_frame(0, 0x02), make_frame(77, 0x03)];
        for (i, f) in originals.iter().enumerate() {
            stream.extend_from_slice(f);
            stream.extend(std::iter::repeat(0x5A).take(i * 3));
        }

        for chunk in 1..=stream.len() {
            let mut extractor = FrameExtractor::new();
            let frames = feed_in_chunks(&mut extractor, &stream, chunk);

            assert_eq!(frames.len(), originals.len(), "chunk size {}", chunk);
            for (frame, original) in frames.iter().zip(originals.iter()) {
                assert_eq!(frame.data().as_ref(), original.as_slice());
            }
        }
    }

    #[test]
    fn test_frames_are_ordered_substrings() {
        let mut stream = Vec::new();
        for i in 0..20u8 {
            stream.extend_from_slice(&[i, 0xFF, 0x00]);
            stream.extend(make_frame(i as usize * 5, i));
        }

        let mut extractor = FrameExtractor::new();
        let frames = feed_in_chunks(&mut extractor, &stream, 7);

        // Each frame occurs in the stream after the previous one, without overlap
        let mut cursor = 0;
        for frame in &frames {
            let bytes = frame.data();
            let pos = stream[cursor..]
                .windows(bytes.len())
                .position(|w| w == bytes.as_ref())
                .expect("frame is not a substring of the stream");
            cursor += pos + bytes.len();
        }
        assert_eq!(frames.len(), 20);
    }

    #[test]
    fn test_garbage_before_marker_not_emitted() {
        let mut data = vec![0xAB; 500];
        data.extend(make_frame(8, 0x44));

        let mut extractor = FrameExtractor::new();
        let frames = extractor.feed(&data);

        assert_eq!(frames.len(), 1);
        assert!(frames[0].data().starts_with(&SOI));
        assert!(!frames[0].data().contains(&0xAB));
        assert_eq!(extractor.stats().bytes_discarded, 500);
    }

    #[test]
    fn test_false_start_markers_tolerated() {
        // A stray SOI before the real frame: the frame runs from the first SOI
        let mut data = vec![0xFF, 0xD8, 0x01, 0x02];
        data.extend(make_frame(4, 0x55));

        let mut extractor = FrameExtractor::new();
        let frames = extractor.feed(&data);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), data.len());
    }

    #[test]
    fn test_end_marker_searched_after_start() {
        // FF D8 D9: the D8 byte must not be reused as part of an EOI
        let mut extractor = FrameExtractor::new();
        assert!(extractor.feed(&[0xFF, 0xD8, 0xD9]).is_empty());

        let frames = extractor.feed(&[0xFF, 0xD9]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data().as_ref(), &[0xFF, 0xD8, 0xD9, 0xFF, 0xD9]);
    }

    #[test]
    fn test_garbage_over_cap_is_halved_and_recovers() {
        let config = ExtractorConfig::default().garbage_cap(1000).hard_cap(4000);
        let mut extractor = FrameExtractor::with_config(config);

        for _ in 0..10 {
            assert!(extractor.feed(&[0x42; 300]).is_empty());
            assert!(extractor.buffered_len() <= 1300);
        }
        assert!(extractor.stats().bytes_discarded > 0);

        let frame = make_frame(20, 0x66);
        let frames = extractor.feed(&frame);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data().as_ref(), frame.as_slice());
    }

    #[test]
    fn test_unterminated_frame_hits_hard_cap() {
        let config = ExtractorConfig::default().garbage_cap(100).hard_cap(1000);
        let mut extractor = FrameExtractor::with_config(config);

        extractor.feed(&SOI);
        for _ in 0..5 {
            extractor.feed(&[0x00; 300]);
        }
        assert_eq!(extractor.stats().overflow_resets, 1);
        assert!(extractor.buffered_len() <= 1000);

        // Stream recovers on the next complete frame
        let frame = make_frame(3, 0x77);
        assert_eq!(extractor.feed(&frame).len(), 1);
    }

    #[test]
    fn test_truncated_frame_at_end_of_stream() {
        let mut extractor = FrameExtractor::new();
        let mut data = SOI.to_vec();
        data.extend_from_slice(&[0x10; 32]);

        assert!(extractor.feed(&data).is_empty());
        assert_eq!(extractor.stats().frames, 0);
        assert_eq!(extractor.finish(), 34);
    }

    #[test]
    fn test_stats_counts() {
        let mut extractor = FrameExtractor::new();
        let mut data = make_frame(1, 0);
        data.extend(make_frame(2, 0));
        extractor.feed(&data);

        let stats = extractor.stats();
        assert_eq!(stats.bytes_fed, data.len() as u64);
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.overflow_resets, 0);
    }
}
