//! Relay pipeline
//!
//! A [`Pipeline`] owns one instance of every shared component: the client
//! registry, the outbound queue and broadcast engine, and the stats counters.
//! Nothing runs until a source is attached with [`Pipeline::start_transcode`]
//! or [`Pipeline::start_with_reader`]; several pipelines can coexist in one
//! process.
//!
//! ```text
//!  source ──► pump ──mpsc──► transform stage ──► FrameQueue ──► BroadcastEngine ──► clients
//!  (reader)   (extractor)     (blocking workers)  (bounded)      (per-write deadline)
//! ```
//!
//! # Shutdown
//!
//! [`Pipeline::shutdown`] cancels one token. The pump stops reading (and the
//! transcoder is killed), which closes the transform channel; the stage then
//! closes the queue; the engine drains it and closes every client. A source
//! that ends by itself takes the same path.

pub mod config;
pub mod stage;

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use config::PipelineConfig;
pub use stage::run_transform_stage;

use crate::broadcast::BroadcastEngine;
use crate::error::{Error, Result};
use crate::media::{transform_for_quality, FrameExtractor};
use crate::registry::{ClientRegistry, RegistryError};
use crate::session::{self, ClientSink, ClientSource, LifecycleConfig, SessionSummary};
use crate::source::{pump, TranscodeSource};
use crate::stats::{PipelineStats, StatsSnapshot};

/// One running relay: a source fanned out to many clients
pub struct Pipeline<S> {
    config: PipelineConfig,
    registry: Arc<ClientRegistry<S>>,
    engine: BroadcastEngine<S>,
    stats: Arc<PipelineStats>,
    shutdown: CancellationToken,
    finished: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl<S: ClientSink> Pipeline<S> {
    /// Build the pipeline components without starting anything
    pub fn new(config: PipelineConfig) -> Self {
        let registry = Arc::new(ClientRegistry::new());
        let stats = Arc::new(PipelineStats::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry), Arc::clone(&stats), &config.broadcast);

        Self {
            config,
            registry,
            engine,
            stats,
            shutdown: CancellationToken::new(),
            finished: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Spawn the transcoder for `descriptor` and start relaying its output
    ///
    /// Fails without starting anything if the transcoder cannot be started.
    pub fn start_transcode(&mut self, descriptor: &str) -> Result<()> {
        if self.is_started() {
            return Err(Error::AlreadyStarted);
        }

        let source = TranscodeSource::spawn(&self.config.transcode, descriptor)?;
        let (stdout, process) = source.into_parts();

        self.start_with_reader(stdout)?;

        let shutdown = self.shutdown.clone();
        self.tasks.push((
            "transcoder",
            tokio::spawn(async move {
                process.supervise(shutdown).await;
            }),
        ));

        Ok(())
    }

    /// Start relaying frames read from `reader`
    pub fn start_with_reader<R>(&mut self, reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        if self.is_started() {
            return Err(Error::AlreadyStarted);
        }

        let (tx, rx) = mpsc::channel(self.config.extract_capacity);

        // Source pump
        let extractor = FrameExtractor::with_config(self.config.extractor.clone());
        let chunk_size = self.config.transcode.read_chunk_size;
        let stats = Arc::clone(&self.stats);
        let shutdown = self.shutdown.clone();
        self.tasks.push((
            "pump",
            tokio::spawn(async move {
                pump(reader, extractor, tx, chunk_size, &stats, shutdown).await;
            }),
        ));

        // Transform stage
        let transform = transform_for_quality(self.config.transform_quality);
        let workers = self.config.transform_workers;
        let engine = self.engine.clone();
        let stats = Arc::clone(&self.stats);
        self.tasks.push((
            "transform",
            tokio::spawn(async move {
                run_transform_stage(rx, transform, workers, &engine, &stats).await;
            }),
        ));

        // Broadcast engine
        let engine = self.engine.start();
        let finished = self.finished.clone();
        self.tasks.push((
            "broadcast",
            tokio::spawn(async move {
                if let Err(e) = engine.await {
                    tracing::error!(error = %e, "Broadcast engine task failed");
                }
                finished.cancel();
            }),
        ));

        // Stats reporter
        self.tasks.push((
            "stats",
            self.stats
                .spawn_reporter(self.config.stats_interval, self.finished.clone()),
        ));

        tracing::info!(
            quality = ?self.config.transform_quality,
            workers,
            queue_capacity = self.config.broadcast.queue_capacity,
            "Pipeline started"
        );

        Ok(())
    }

    /// Whether a source has been attached
    pub fn is_started(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Handle for serving clients from connection tasks
    pub fn handle(&self) -> PipelineHandle<S> {
        PipelineHandle {
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            lifecycle: self.config.lifecycle(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// The broadcast engine; frames published here skip source and transform
    pub fn engine(&self) -> &BroadcastEngine<S> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<ClientRegistry<S>> {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token cancelled once the broadcast engine has stopped
    pub fn finished(&self) -> CancellationToken {
        self.finished.clone()
    }

    /// Begin shutdown
    ///
    /// Returns immediately; use [`Pipeline::join`] to wait for completion.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Pipeline shutting down");
        }
        self.shutdown.cancel();
    }

    /// Wait for every pipeline task to finish
    pub async fn join(mut self) -> StatsSnapshot {
        if !self.is_started() {
            // Nothing will ever close the queue, so do it here
            self.shutdown.cancel();
            self.engine.queue().close();
            self.registry.close_all().await;
            self.finished.cancel();
        }

        for (name, task) in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!(task = name, error = %e, "Pipeline task failed");
            }
        }

        // Client tasks watch this token
        self.shutdown.cancel();

        let snapshot = self.stats.snapshot();
        tracing::info!(
            extracted = snapshot.frames_extracted,
            broadcast = snapshot.frames_broadcast,
            dropped = snapshot.dropped_frames(),
            evicted = snapshot.clients_evicted,
            "Pipeline stopped"
        );

        snapshot
    }
}

/// Cloneable handle used by connection tasks
pub struct PipelineHandle<S> {
    registry: Arc<ClientRegistry<S>>,
    stats: Arc<PipelineStats>,
    lifecycle: LifecycleConfig,
    shutdown: CancellationToken,
}

impl<S> Clone for PipelineHandle<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            lifecycle: self.lifecycle.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S: ClientSink> PipelineHandle<S> {
    /// Register a client and serve it until it disconnects
    pub async fn serve_client<R: ClientSource>(
        &self,
        sink: S,
        source: R,
    ) -> std::result::Result<SessionSummary, RegistryError> {
        let result = session::serve_client(
            &self.registry,
            sink,
            source,
            &self.lifecycle,
            self.shutdown.clone(),
        )
        .await;

        self.stats.set_clients(self.registry.len().await as u64);
        result
    }

    /// Number of connected clients
    pub async fn client_count(&self) -> usize {
        self.registry.len().await
    }

    /// Whether the pipeline is shutting down
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled() || self.registry.is_closed()
    }
}
