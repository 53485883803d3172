//! Pipeline configuration

use std::time::Duration;

use crate::broadcast::BroadcastConfig;
use crate::media::ExtractorConfig;
use crate::session::LifecycleConfig;
use crate::source::TranscodeConfig;

/// Default capacity of the extractor to transform channel
pub const DEFAULT_EXTRACT_CAPACITY: usize = 100;

/// Default recompression quality
pub const DEFAULT_TRANSFORM_QUALITY: u8 = 30;

/// Configuration for one relay pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Frame reassembly limits
    pub extractor: ExtractorConfig,

    /// Transcoder process options
    pub transcode: TranscodeConfig,

    /// Outbound queue and delivery options
    pub broadcast: BroadcastConfig,

    /// Frames buffered between extraction and transform
    pub extract_capacity: usize,

    /// Recompression quality (None = forward frames unchanged)
    pub transform_quality: Option<u8>,

    /// Frames transformed in parallel
    pub transform_workers: usize,

    /// Interval between client liveness probes
    pub keepalive_interval: Duration,

    /// Interval between stats log lines
    pub stats_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            transcode: TranscodeConfig::default(),
            broadcast: BroadcastConfig::default(),
            extract_capacity: DEFAULT_EXTRACT_CAPACITY,
            transform_quality: Some(DEFAULT_TRANSFORM_QUALITY),
            transform_workers: default_workers(),
            keepalive_interval: Duration::from_secs(30),
            stats_interval: Duration::from_secs(10),
        }
    }
}

impl PipelineConfig {
    /// Set the extractor limits
    pub fn extractor(mut self, config: ExtractorConfig) -> Self {
        self.extractor = config;
        self
    }

    /// Set the transcoder options
    pub fn transcode(mut self, config: TranscodeConfig) -> Self {
        self.transcode = config;
        self
    }

    /// Set the broadcast options
    pub fn broadcast(mut self, config: BroadcastConfig) -> Self {
        self.broadcast = config;
        self
    }

    /// Set the extractor to transform channel capacity (at least one)
    pub fn extract_capacity(mut self, capacity: usize) -> Self {
        self.extract_capacity = capacity.max(1);
        self
    }

    /// Set the recompression quality, or `None` to disable
    pub fn transform_quality(mut self, quality: Option<u8>) -> Self {
        self.transform_quality = quality;
        self
    }

    /// Set the number of parallel transforms (at least one)
    pub fn transform_workers(mut self, workers: usize) -> Self {
        self.transform_workers = workers.max(1);
        self
    }

    /// Set the keepalive interval
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the stats log interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Keepalive settings for client sessions
    ///
    /// Probes share the frame write deadline.
    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig::default()
            .keepalive_interval(self.keepalive_interval)
            .probe_timeout(self.broadcast.write_timeout)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
