//! Error types for the relay
//!
//! Only a failure to start the transcode source is fatal. Everything else is
//! recovered where it happens: transform errors fall back to the original
//! frame, connection errors evict a single client, and queue overflow drops
//! frames without reporting anything.

use std::path::PathBuf;
use std::time::Duration;

use crate::registry::RegistryError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transcode source could not be started
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Frame could not be recompressed
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// Client connection failed
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Client registry rejected the operation
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The pipeline already has a source attached
    #[error("pipeline already started")]
    AlreadyStarted,
}

/// Errors raised while starting the transcode source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Input path does not exist
    #[error("input not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Input path exists but is not a regular file
    #[error("input is not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// The transcoder process could not be spawned
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was invoked
        program: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// The transcoder process has no piped stdout
    #[error("transcoder stdout is not piped")]
    NoStdout,
}

/// Errors raised by the frame transform stage
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Input does not carry JPEG start/end markers
    #[error("frame is not a JPEG image")]
    NotJpeg,

    /// Input could not be decoded
    #[error("decode failed: {0}")]
    Decode(#[source] image::ImageError),

    /// Decoded image could not be re-encoded
    #[error("encode failed: {0}")]
    Encode(#[source] image::ImageError),

    /// Blocking worker panicked or was cancelled
    #[error("transform worker failed: {0}")]
    Worker(String),
}

/// Errors raised while writing to or reading from a client connection
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Peer closed the connection
    #[error("connection closed")]
    Closed,

    /// A write did not finish within its deadline
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ConnectionError {
    /// Wrap any transport error
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ConnectionError::Transport(Box::new(err))
    }
}
