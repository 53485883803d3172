//! mjpeg-relay: transcode a video source to MJPEG and relay it over WebSocket

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mjpeg_relay::broadcast::{BroadcastConfig, DropPolicy};
use mjpeg_relay::media::ExtractorConfig;
use mjpeg_relay::pipeline::{Pipeline, PipelineConfig};
use mjpeg_relay::server::{RelayServer, ServerConfig, WsSink};
use mjpeg_relay::source::TranscodeConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Relays a transcoded MJPEG stream to WebSocket clients", long_about = None)]
struct Args {
    /// Input file path or URL passed to the transcoder
    #[arg(env = "MJPEG_RELAY_INPUT")]
    input: String,

    /// Address to listen on
    #[arg(short, long, env = "MJPEG_RELAY_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// WebSocket route
    #[arg(long, env = "MJPEG_RELAY_WS_PATH", default_value = "/ws")]
    ws_path: String,

    /// Health check route
    #[arg(long, env = "MJPEG_RELAY_HEALTH_PATH", default_value = "/health")]
    health_path: String,

    /// Transcoder executable
    #[arg(long, env = "MJPEG_RELAY_TRANSCODER", default_value = "ffmpeg")]
    transcoder: String,

    /// Output frame rate
    #[arg(long, env = "MJPEG_RELAY_FPS", default_value_t = 10)]
    fps: u32,

    /// Output width
    #[arg(long, env = "MJPEG_RELAY_WIDTH", default_value_t = 640)]
    width: u32,

    /// Output height
    #[arg(long, env = "MJPEG_RELAY_HEIGHT", default_value_t = 360)]
    height: u32,

    /// Transcoder MJPEG quantizer (2-31, lower is better)
    #[arg(long, env = "MJPEG_RELAY_QSCALE", default_value_t = 8)]
    qscale: u8,

    /// Loop the input forever
    #[arg(long = "loop", env = "MJPEG_RELAY_LOOP")]
    loop_input: bool,

    /// Read the input as fast as possible instead of at native rate
    #[arg(long, env = "MJPEG_RELAY_NO_REALTIME")]
    no_realtime: bool,

    /// Recompression quality (1-100)
    #[arg(
        short,
        long,
        env = "MJPEG_RELAY_QUALITY",
        default_value_t = 30,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    quality: u8,

    /// Forward frames exactly as the transcoder produced them
    #[arg(long, env = "MJPEG_RELAY_NO_RECOMPRESS")]
    no_recompress: bool,

    /// Parallel recompression workers (defaults to available cores)
    #[arg(long, env = "MJPEG_RELAY_WORKERS")]
    workers: Option<usize>,

    /// Outbound queue capacity in frames
    #[arg(long, env = "MJPEG_RELAY_QUEUE_CAPACITY", default_value_t = 200)]
    queue_capacity: usize,

    /// Frame to drop when the queue is full (newest, oldest)
    #[arg(long, env = "MJPEG_RELAY_DROP_POLICY", default_value = "newest")]
    drop_policy: DropPolicy,

    /// Per-client write deadline in milliseconds
    #[arg(long, env = "MJPEG_RELAY_WRITE_TIMEOUT_MS", default_value_t = 5000)]
    write_timeout_ms: u64,

    /// Keepalive ping interval in seconds
    #[arg(long, env = "MJPEG_RELAY_KEEPALIVE_SECS", default_value_t = 30)]
    keepalive_secs: u64,

    /// Stats log interval in seconds
    #[arg(long, env = "MJPEG_RELAY_STATS_SECS", default_value_t = 10)]
    stats_secs: u64,

    /// Extractor buffer size that triggers a reset, in bytes; also caps the
    /// markerless-data threshold
    #[arg(long, env = "MJPEG_RELAY_MAX_FRAME_BYTES", default_value_t = 5 * 1024 * 1024)]
    max_frame_bytes: usize,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "MJPEG_RELAY_LOG", default_value = "info")]
    log_level: String,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let transcode = TranscodeConfig::default()
            .program(self.transcoder.clone())
            .fps(self.fps)
            .size(self.width, self.height)
            .qscale(self.qscale)
            .realtime(!self.no_realtime)
            .loop_input(self.loop_input);

        let broadcast = BroadcastConfig::default()
            .queue_capacity(self.queue_capacity)
            .drop_policy(self.drop_policy)
            .write_timeout(Duration::from_millis(self.write_timeout_ms));

        let extractor = ExtractorConfig::default().hard_cap(self.max_frame_bytes);

        let mut config = PipelineConfig::default()
            .extractor(extractor)
            .transcode(transcode)
            .broadcast(broadcast)
            .transform_quality((!self.no_recompress).then_some(self.quality))
            .keepalive_interval(Duration::from_secs(self.keepalive_secs.max(1)))
            .stats_interval(Duration::from_secs(self.stats_secs.max(1)));

        if let Some(workers) = self.workers {
            config = config.transform_workers(workers);
        }

        config
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig::with_addr(self.bind)
            .ws_path(self.ws_path.clone())
            .health_path(self.health_path.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut pipeline: Pipeline<WsSink> = Pipeline::new(args.pipeline_config());
    pipeline
        .start_transcode(&args.input)
        .with_context(|| format!("failed to start transcoder for {}", args.input))?;

    let shutdown = CancellationToken::new();
    let server = RelayServer::new(args.server_config(), pipeline.handle());
    let mut server_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.run_until(shutdown).await })
    };

    let finished = pipeline.finished();
    let early_exit = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            None
        }
        _ = finished.cancelled() => {
            tracing::info!("Source finished");
            None
        }
        result = &mut server_task => Some(result),
    };

    // Source first, so clients are closed before the server stops
    pipeline.shutdown();
    shutdown.cancel();

    let server_result = match early_exit {
        Some(result) => result,
        None => server_task.await,
    };

    let stats = pipeline.join().await;
    tracing::info!(
        frames = stats.frames_broadcast,
        dropped = stats.dropped_frames(),
        uptime_secs = stats.uptime.as_secs(),
        "Relay stopped"
    );

    server_result
        .context("server task panicked")?
        .context("server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
