//! Broadcast drain loop
//!
//! Frames are published into a bounded [`FrameQueue`]. A single task started
//! with [`BroadcastEngine::start`] pops them in FIFO order and writes each one
//! to a snapshot of the registry. Writes to different clients run
//! concurrently, each bounded by the configured write deadline, so a stalled
//! client costs at most one deadline per frame before it is evicted.
//!
//! Failed clients are collected during the pass and removed only after it
//! completes. When the queue is closed and drained the loop closes every
//! remaining client and ends.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;

use super::config::BroadcastConfig;
use super::queue::{FrameQueue, PushOutcome};
use crate::registry::{ClientId, ClientRegistry, Frame};
use crate::session::ClientSink;
use crate::stats::PipelineStats;

/// How often per-frame progress is logged
const PROGRESS_EVERY: u64 = 100;

/// Result of broadcasting one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastPass {
    /// Clients the frame was written to
    pub delivered: usize,
    /// Clients removed after a failed or timed-out write
    pub evicted: Vec<ClientId>,
}

/// Fan-out engine between the outbound queue and the client registry
pub struct BroadcastEngine<S> {
    registry: Arc<ClientRegistry<S>>,
    queue: Arc<FrameQueue>,
    stats: Arc<PipelineStats>,
    write_timeout: Duration,
}

impl<S> Clone for BroadcastEngine<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            queue: Arc::clone(&self.queue),
            stats: Arc::clone(&self.stats),
            write_timeout: self.write_timeout,
        }
    }
}

impl<S: ClientSink> BroadcastEngine<S> {
    /// Create an engine with its own queue
    pub fn new(
        registry: Arc<ClientRegistry<S>>,
        stats: Arc<PipelineStats>,
        config: &BroadcastConfig,
    ) -> Self {
        let queue = Arc::new(FrameQueue::new(config.queue_capacity, config.drop_policy));
        Self::with_queue(registry, queue, stats, config.write_timeout)
    }

    /// Create an engine draining an existing queue
    pub fn with_queue(
        registry: Arc<ClientRegistry<S>>,
        queue: Arc<FrameQueue>,
        stats: Arc<PipelineStats>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            queue,
            stats,
            write_timeout,
        }
    }

    /// The queue frames are published into
    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    /// The registry frames are delivered to
    pub fn registry(&self) -> &Arc<ClientRegistry<S>> {
        &self.registry
    }

    /// Enqueue a frame for broadcast
    ///
    /// Never waits. A frame lost to a full queue is only counted.
    pub fn publish(&self, frame: Frame) -> PushOutcome {
        let outcome = self.queue.push(frame);

        if outcome.is_queued() {
            self.stats.inc_frames_enqueued();
        }
        if outcome.dropped() {
            self.stats.inc_queue_drops();
        }

        outcome
    }

    /// Spawn the drain loop
    ///
    /// The task ends after the queue is closed and drained; it returns the
    /// number of frames it broadcast.
    pub fn start(&self) -> JoinHandle<u64> {
        let engine = self.clone();
        tokio::spawn(async move { engine.run().await })
    }

    /// Drain the queue until it is closed, then close all clients
    pub async fn run(self) -> u64 {
        tracing::info!(
            capacity = self.queue.capacity(),
            write_timeout_ms = self.write_timeout.as_millis() as u64,
            "Broadcast engine started"
        );

        let mut broadcast = 0u64;

        while let Some(frame) = self.queue.pop().await {
            let pass = self.broadcast_frame(&frame).await;
            broadcast += 1;
            self.stats.inc_frames_broadcast();

            if broadcast % PROGRESS_EVERY == 0 {
                tracing::debug!(
                    frames = broadcast,
                    size = frame.len(),
                    clients = pass.delivered,
                    queued = self.queue.len(),
                    "Broadcast progress"
                );
            }
        }

        let closed = self.registry.close_all().await;
        self.stats.set_clients(0);

        tracing::info!(frames = broadcast, clients_closed = closed, "Broadcast engine stopped");

        broadcast
    }

    /// Write one frame to every registered client
    ///
    /// Clients whose write fails or exceeds the deadline are removed once
    /// every write in the pass has finished. Their connections are closed in
    /// the background, so a pass takes at most one write deadline.
    pub async fn broadcast_frame(&self, frame: &Frame) -> BroadcastPass {
        let clients = self.registry.snapshot().await;
        if clients.is_empty() {
            return BroadcastPass::default();
        }

        let writes = clients.iter().map(|client| {
            let data = frame.data().clone();
            async move {
                let result = client.send_frame(data, self.write_timeout).await;
                (client.id(), result)
            }
        });
        let results = join_all(writes).await;

        let mut pass = BroadcastPass::default();
        for (id, result) in results {
            match result {
                Ok(()) => pass.delivered += 1,
                Err(e) => {
                    tracing::warn!(client_id = %id, error = %e, "Frame write failed, evicting client");
                    pass.evicted.push(id);
                }
            }
        }

        let removed = self.registry.evict(&pass.evicted, self.write_timeout).await;
        if removed > 0 {
            self.stats.add_clients_evicted(removed as u64);
        }
        self.stats.set_clients(self.registry.len().await as u64);

        pass
    }
}
