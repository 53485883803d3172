//! Statistics for a running pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Live pipeline counters
///
/// Shared between all pipeline tasks; every update is a relaxed atomic add.
#[derive(Debug)]
pub struct PipelineStats {
    started_at: Instant,
    bytes_read: AtomicU64,
    frames_extracted: AtomicU64,
    extract_drops: AtomicU64,
    transform_fallbacks: AtomicU64,
    frames_enqueued: AtomicU64,
    queue_drops: AtomicU64,
    frames_broadcast: AtomicU64,
    clients: AtomicU64,
    clients_evicted: AtomicU64,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_read: AtomicU64::new(0),
            frames_extracted: AtomicU64::new(0),
            extract_drops: AtomicU64::new(0),
            transform_fallbacks: AtomicU64::new(0),
            frames_enqueued: AtomicU64::new(0),
            queue_drops: AtomicU64::new(0),
            frames_broadcast: AtomicU64::new(0),
            clients: AtomicU64::new(0),
            clients_evicted: AtomicU64::new(0),
        }
    }

    pub fn add_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_frames_extracted(&self) {
        self.frames_extracted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_extract_drops(&self) {
        self.extract_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_transform_fallbacks(&self) {
        self.transform_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_enqueued(&self) {
        self.frames_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queue_drops(&self) {
        self.queue_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_broadcast(&self) {
        self.frames_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_clients(&self, count: u64) {
        self.clients.store(count, Ordering::Relaxed);
    }

    pub fn add_clients_evicted(&self, n: u64) {
        self.clients_evicted.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            frames_extracted: self.frames_extracted.load(Ordering::Relaxed),
            extract_drops: self.extract_drops.load(Ordering::Relaxed),
            transform_fallbacks: self.transform_fallbacks.load(Ordering::Relaxed),
            frames_enqueued: self.frames_enqueued.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            frames_broadcast: self.frames_broadcast.load(Ordering::Relaxed),
            clients: self.clients.load(Ordering::Relaxed),
            clients_evicted: self.clients_evicted.load(Ordering::Relaxed),
        }
    }

    /// Spawn a task that logs a summary every `interval`
    ///
    /// Nothing is logged while no frames have been processed. The task ends
    /// when `shutdown` is cancelled.
    pub fn spawn_reporter(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let stats = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let snap = stats.snapshot();
                        if snap.is_active() {
                            tracing::info!(
                                extracted = snap.frames_extracted,
                                broadcast = snap.frames_broadcast,
                                dropped = snap.dropped_frames(),
                                clients = snap.clients,
                                fps = snap.extracted_fps(),
                                "Pipeline stats"
                            );
                        }
                    }
                }
            }
        })
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Time since the counters were created
    pub uptime: Duration,
    /// Bytes read from the transcode source
    pub bytes_read: u64,
    /// Frames produced by the extractor
    pub frames_extracted: u64,
    /// Frames dropped because the transform stage was full
    pub extract_drops: u64,
    /// Frames passed through because recompression failed
    pub transform_fallbacks: u64,
    /// Frames accepted by the outbound queue
    pub frames_enqueued: u64,
    /// Frames dropped by the outbound queue
    pub queue_drops: u64,
    /// Frames taken off the queue and delivered to at least the snapshot
    pub frames_broadcast: u64,
    /// Currently connected clients
    pub clients: u64,
    /// Clients removed after a failed write or probe
    pub clients_evicted: u64,
}

impl StatsSnapshot {
    /// Whether anything has flowed through the pipeline
    pub fn is_active(&self) -> bool {
        self.frames_extracted > 0 || self.frames_broadcast > 0
    }

    /// Frames lost to backpressure at either stage
    pub fn dropped_frames(&self) -> u64 {
        self.extract_drops + self.queue_drops
    }

    /// Average extraction rate since start
    pub fn extracted_fps(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.frames_extracted as f64 / secs
        } else {
            0.0
        }
    }
}
