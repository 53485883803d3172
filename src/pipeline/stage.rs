//! Transform stage
//!
//! Sits between the source pump and the broadcast queue. Each frame is
//! transformed on a blocking worker thread; up to `workers` frames are in
//! flight at once and results are published in the order frames arrived.
//! When the upstream channel closes the outbound queue is closed, which lets
//! the broadcast engine drain and stop.

use std::pin::pin;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::broadcast::BroadcastEngine;
use crate::error::TransformError;
use crate::media::FrameTransform;
use crate::registry::Frame;
use crate::session::ClientSink;
use crate::stats::PipelineStats;

/// Run the transform stage until `rx` closes
///
/// Returns the number of frames handed to the engine.
pub async fn run_transform_stage<S: ClientSink>(
    rx: mpsc::Receiver<Frame>,
    transform: Arc<dyn FrameTransform>,
    workers: usize,
    engine: &BroadcastEngine<S>,
    stats: &PipelineStats,
) -> u64 {
    let frames = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    });

    let mut outputs = pin!(frames
        .map(|frame| transform_blocking(Arc::clone(&transform), frame))
        .buffered(workers.max(1)));

    let mut published = 0u64;

    while let Some((frame, result)) = outputs.next().await {
        if let Err(e) = result {
            stats.inc_transform_fallbacks();
            tracing::warn!(error = %e, size = frame.len(), "Transform failed, forwarding original frame");
        }

        engine.publish(frame);
        published += 1;
    }

    engine.queue().close();
    tracing::debug!(frames = published, "Transform stage finished");

    published
}

/// Transform one frame off the async runtime
///
/// Always yields a frame: the transformed one, or the original on failure.
async fn transform_blocking(
    transform: Arc<dyn FrameTransform>,
    frame: Frame,
) -> (Frame, Result<(), TransformError>) {
    let input = frame.clone();

    match tokio::task::spawn_blocking(move || transform.try_transform(&input)).await {
        Ok(Ok(out)) => (out, Ok(())),
        Ok(Err(e)) => (frame, Err(e)),
        Err(e) => (frame, Err(TransformError::Worker(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::broadcast::BroadcastConfig;
    use crate::media::marker::tests::encode_test_jpeg;
    use crate::media::{validate_frame, JpegRecompressor, Passthrough};
    use crate::registry::ClientRegistry;
    use crate::session::connection::testing::RecordingSink;

    /// Sleeps longer for earlier frames so results finish out of order
    struct SlowFirst;

    impl FrameTransform for SlowFirst {
        fn try_transform(&self, frame: &Frame) -> Result<Frame, TransformError> {
            let delay = 40u64.saturating_sub(frame.data()[2] as u64 * 10);
            std::thread::sleep(Duration::from_millis(delay));
            Ok(frame.clone())
        }
    }

    fn engine() -> (BroadcastEngine<RecordingSink>, Arc<PipelineStats>) {
        let stats = Arc::new(PipelineStats::new());
        let engine = BroadcastEngine::new(
            Arc::new(ClientRegistry::new()),
            Arc::clone(&stats),
            &BroadcastConfig::default(),
        );
        (engine, stats)
    }

    fn tagged(n: u8) -> Frame {
        Frame::from(vec![0xFF, 0xD8, n, 0xFF, 0xD9])
    }

    #[tokio::test]
    async fn test_stage_preserves_order() {
        let (engine, stats) = engine();
        let (tx, rx) = mpsc::channel(8);
        for n in 0..4 {
            tx.send(tagged(n)).await.unwrap();
        }
        drop(tx);

        let published = run_transform_stage(rx, Arc::new(SlowFirst), 4, &engine, &stats).await;

        assert_eq!(published, 4);
        assert!(engine.queue().is_closed());
        let order: Vec<u8> = std::iter::from_fn(|| engine.queue().try_pop())
            .map(|f| f.data()[2])
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stage_recompresses() {
        let (engine, stats) = engine();
        let (tx, rx) = mpsc::channel(8);
        let jpeg = encode_test_jpeg(32, 32, 100);
        tx.send(Frame::new(Bytes::from(jpeg.clone()))).await.unwrap();
        drop(tx);

        run_transform_stage(rx, Arc::new(JpegRecompressor::new(30)), 2, &engine, &stats).await;

        let out = engine.queue().try_pop().unwrap();
        assert!(validate_frame(out.data()));
        assert!(out.len() < jpeg.len());
        assert_eq!(stats.snapshot().transform_fallbacks, 0);
    }

    #[tokio::test]
    async fn test_stage_falls_back_on_failure() {
        let (engine, stats) = engine();
        let (tx, rx) = mpsc::channel(8);
        let corrupt = tagged(9);
        tx.send(corrupt.clone()).await.unwrap();
        drop(tx);

        run_transform_stage(rx, Arc::new(JpegRecompressor::new(30)), 1, &engine, &stats).await;

        let out = engine.queue().try_pop().unwrap();
        assert_eq!(out, corrupt);
        assert_eq!(stats.snapshot().transform_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_stage_closes_queue_on_empty_input() {
        let (engine, stats) = engine();
        let (tx, rx) = mpsc::channel::<Frame>(1);
        drop(tx);

        let published = run_transform_stage(rx, Arc::new(Passthrough), 1, &engine, &stats).await;

        assert_eq!(published, 0);
        assert!(engine.queue().is_closed());
    }
}
