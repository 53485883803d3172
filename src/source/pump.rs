//! Source read loop
//!
//! Reads the transcoder output in fixed-size chunks, feeds every chunk to a
//! [`FrameExtractor`] and forwards completed frames downstream. The forward
//! never waits: when the downstream channel is full the frame is dropped and
//! counted.
//!
//! The loop ends at end of stream, on a read error, when the downstream side
//! goes away, or on shutdown. In every case the sender is dropped on return,
//! which is what closes the rest of the pipeline.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::media::FrameExtractor;
use crate::registry::Frame;
use crate::stats::PipelineStats;

/// How often extraction progress is logged
const PROGRESS_EVERY: u64 = 30;

/// Why the read loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// Source reached end of stream
    Eof,
    /// Source read failed
    ReadError,
    /// Downstream receiver was dropped
    Closed,
    /// Shutdown was requested
    Cancelled,
}

impl fmt::Display for PumpEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PumpEnd::Eof => "end of stream",
            PumpEnd::ReadError => "read error",
            PumpEnd::Closed => "downstream closed",
            PumpEnd::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What the read loop did before it stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpSummary {
    pub end: PumpEnd,
    pub bytes_read: u64,
    pub frames: u64,
    pub dropped: u64,
    /// Trailing bytes of an unterminated frame, discarded at the end
    pub discarded_tail: usize,
}

/// Run the read loop until the source ends
pub async fn pump<R>(
    mut reader: R,
    mut extractor: FrameExtractor,
    tx: mpsc::Sender<Frame>,
    chunk_size: usize,
    stats: &PipelineStats,
    shutdown: CancellationToken,
) -> PumpSummary
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut bytes_read = 0u64;
    let mut frames = 0u64;
    let mut dropped = 0u64;

    let end = 'read: loop {
        let n = tokio::select! {
            _ = shutdown.cancelled() => break 'read PumpEnd::Cancelled,
            result = reader.read(&mut buf) => match result {
                Ok(0) => break 'read PumpEnd::Eof,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "Source read failed");
                    break 'read PumpEnd::ReadError;
                }
            },
        };

        bytes_read += n as u64;
        stats.add_bytes_read(n as u64);

        for frame in extractor.feed(&buf[..n]) {
            frames += 1;
            stats.inc_frames_extracted();

            if frames % PROGRESS_EVERY == 0 {
                tracing::debug!(frames, size = frame.len(), "Extracted frame");
            }

            match tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    stats.inc_extract_drops();
                    tracing::trace!("Transform stage full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => break 'read PumpEnd::Closed,
            }
        }
    };

    let discarded_tail = extractor.finish();
    drop(tx);

    tracing::info!(
        reason = %end,
        bytes = bytes_read,
        frames,
        dropped,
        discarded_tail,
        "Source ended"
    );

    PumpSummary {
        end,
        bytes_read,
        frames,
        dropped,
        discarded_tail,
    }
}
