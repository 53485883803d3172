//! Live MJPEG relay
//!
//! Reads the output of an external transcoder (or any byte reader),
//! reassembles complete JPEG frames from the unchunked stream, optionally
//! recompresses them, and fans every frame out to all connected WebSocket
//! clients.
//!
//! # Example
//!
//! ```no_run
//! use mjpeg_relay::pipeline::{Pipeline, PipelineConfig};
//! use mjpeg_relay::server::{RelayServer, ServerConfig, WsSink};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> mjpeg_relay::Result<()> {
//! let mut pipeline: Pipeline<WsSink> = Pipeline::new(PipelineConfig::default());
//! pipeline.start_transcode("/videos/input.mp4")?;
//!
//! let shutdown = CancellationToken::new();
//! let server = RelayServer::new(ServerConfig::default(), pipeline.handle());
//! server.run_until(shutdown).await?;
//!
//! pipeline.shutdown();
//! pipeline.join().await;
//! # Ok(())
//! # }
//! ```
//!
//! Frames are dropped rather than queued without bound: the extractor hands
//! off to the transform stage with a non-blocking send, and the outbound
//! queue drops the newest frame when full. A client that cannot keep up is
//! evicted after one missed write deadline.

pub mod broadcast;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod registry;
pub mod server;
pub mod session;
pub mod source;
pub mod stats;

pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineConfig, PipelineHandle};
pub use registry::{ClientId, Frame};
