//! Client entry and state types
//!
//! Each connected subscriber is represented by a [`ClientHandle`] owned by the
//! registry. Writes to the client's sink go through a per-client async mutex,
//! so a broadcast write and a keepalive probe never hit the connection at the
//! same time.
//!
//! ```text
//!   connected --(write failure | timeout | close)--> failed --(removed)--> gone
//! ```
//!
//! There is no way back to `Connected`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::frame::ClientId;
use crate::error::ConnectionError;
use crate::session::ClientSink;

/// Liveness state of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Client is receiving frames
    Connected,
    /// A write failed, timed out, or the client was closed
    Failed,
}

/// A registered subscriber
pub struct ClientHandle<S> {
    id: ClientId,
    sink: Mutex<S>,
    failed: AtomicBool,
    /// Cancelled when the client is removed from the registry
    removed: CancellationToken,
    connected_at: Instant,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl<S: ClientSink> ClientHandle<S> {
    pub(super) fn new(id: ClientId, sink: S) -> Self {
        Self {
            id,
            sink: Mutex::new(sink),
            failed: AtomicBool::new(false),
            removed: CancellationToken::new(),
            connected_at: Instant::now(),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Client identifier
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Current liveness state
    pub fn state(&self) -> ClientState {
        if self.failed.load(Ordering::Acquire) {
            ClientState::Failed
        } else {
            ClientState::Connected
        }
    }

    /// Whether the client is still connected
    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    /// Mark the client failed (one-way)
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    /// Time since the client was registered
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Frames successfully written to this client
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Bytes successfully written to this client
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Resolves once the client has been removed from the registry
    pub async fn removed(&self) {
        self.removed.cancelled().await
    }

    /// Whether the client has been removed from the registry
    pub fn is_removed(&self) -> bool {
        self.removed.is_cancelled()
    }

    pub(super) fn mark_removed(&self) {
        self.mark_failed();
        self.removed.cancel();
    }

    /// Write one frame, bounded by `deadline`
    ///
    /// The deadline includes waiting for the per-client write lock. Any
    /// failure marks the client failed.
    pub async fn send_frame(&self, data: Bytes, deadline: Duration) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::Closed);
        }

        let len = data.len() as u64;
        let result = bounded(deadline, async {
            let mut sink = self.sink.lock().await;
            sink.write_binary(data).await
        })
        .await;

        match result {
            Ok(()) => {
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
                self.bytes_sent.fetch_add(len, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.mark_failed();
                Err(e)
            }
        }
    }

    /// Send a liveness probe, bounded by `deadline`
    pub async fn send_ping(&self, deadline: Duration) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::Closed);
        }

        let result = bounded(deadline, async {
            let mut sink = self.sink.lock().await;
            sink.write_ping().await
        })
        .await;

        if result.is_err() {
            self.mark_failed();
        }
        result
    }

    /// Close the underlying connection, bounded by `deadline`
    pub async fn close(&self, deadline: Duration) -> Result<(), ConnectionError> {
        self.mark_failed();
        bounded(deadline, async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        })
        .await
    }
}

/// Run a connection operation under a deadline
async fn bounded<F>(deadline: Duration, op: F) -> Result<(), ConnectionError>
where
    F: Future<Output = Result<(), ConnectionError>>,
{
    match tokio::time::timeout(deadline, op).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::Timeout(deadline)),
    }
}

impl<S> std::fmt::Debug for ClientHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("failed", &self.failed.load(Ordering::Relaxed))
            .field("frames_sent", &self.frames_sent.load(Ordering::Relaxed))
            .finish()
    }
}
