//! Per-client connection lifecycle
//!
//! One task per connected client. It registers the client, then waits on
//! four things at once: the keepalive ticker, the peer's read side, removal
//! from the registry (eviction by the broadcast engine), and the pipeline
//! shutdown token. Whichever ends the session, the client is removed from
//! the registry exactly once on the way out.

use std::fmt;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connection::{ClientSink, ClientSource};
use crate::registry::{ClientId, ClientRegistry, RegistryError};

/// Default interval between liveness probes
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default deadline for a single probe write
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Keepalive options for client sessions
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Interval between liveness probes
    pub keepalive_interval: Duration,

    /// Deadline for a single probe write
    pub probe_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl LifecycleConfig {
    /// Set the keepalive interval
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the probe deadline
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

/// Why a client session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed its side or the read failed
    PeerClosed,
    /// A liveness probe failed or timed out
    ProbeFailed,
    /// Removed from the registry by someone else
    Evicted,
    /// Pipeline shutdown
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisconnectReason::PeerClosed => "peer closed",
            DisconnectReason::ProbeFailed => "probe failed",
            DisconnectReason::Evicted => "evicted",
            DisconnectReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Outcome of a finished client session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub client_id: ClientId,
    pub reason: DisconnectReason,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub duration: Duration,
}

/// Register a client and keep it alive until it disconnects
///
/// `source.read_message()` is polled inside a `select!` and must be cancel
/// safe. Returns an error only if the registry no longer accepts clients.
pub async fn serve_client<S, R>(
    registry: &ClientRegistry<S>,
    sink: S,
    mut source: R,
    config: &LifecycleConfig,
    shutdown: CancellationToken,
) -> Result<SessionSummary, RegistryError>
where
    S: ClientSink,
    R: ClientSource,
{
    let client = registry.add(sink).await?;
    let id = client.id();

    let interval = config.keepalive_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            biased;

            _ = client.removed() => break DisconnectReason::Evicted,
            _ = shutdown.cancelled() => break DisconnectReason::Shutdown,
            result = source.read_message() => {
                if let Err(e) = result {
                    tracing::debug!(client_id = %id, error = %e, "Client read side ended");
                    break DisconnectReason::PeerClosed;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = client.send_ping(config.probe_timeout).await {
                    tracing::warn!(client_id = %id, error = %e, "Keepalive probe failed");
                    break DisconnectReason::ProbeFailed;
                }
                tracing::trace!(client_id = %id, "Keepalive sent");
            }
        }
    };

    registry.remove(id).await;

    let summary = SessionSummary {
        client_id: id,
        reason,
        frames_sent: client.frames_sent(),
        bytes_sent: client.bytes_sent(),
        duration: client.connected_for(),
    };

    tracing::debug!(
        client_id = %id,
        reason = %reason,
        frames = summary.frames_sent,
        bytes = summary.bytes_sent,
        "Client session ended"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::session::connection::testing::{ChannelSource, RecordingSink, SinkMode};

    fn config() -> LifecycleConfig {
        LifecycleConfig::default()
            .keepalive_interval(Duration::from_secs(30))
            .probe_timeout(Duration::from_secs(1))
    }

    async fn wait_registered(registry: &ClientRegistry<RecordingSink>) -> ClientId {
        loop {
            if let Some(client) = registry.snapshot().await.first() {
                return client.id();
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_pings_while_idle() {
        let registry = Arc::new(ClientRegistry::new());
        let (sink, log) = RecordingSink::healthy();
        let (source, peer) = ChannelSource::new();

        let task = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                serve_client(&registry, sink, source, &config(), CancellationToken::new()).await
            })
        };

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(log.pings(), 3);
        assert_eq!(registry.len().await, 1);

        // Peer messages are ignored
        peer.send(()).unwrap();
        drop(peer);

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.reason, DisconnectReason::PeerClosed);
        assert!(log.is_closed());
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_removes_client() {
        let registry = Arc::new(ClientRegistry::new());
        let (sink, log) = RecordingSink::new(SinkMode::Failing);
        let (source, _peer) = ChannelSource::new();

        let summary = serve_client(&registry, sink, source, &config(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.reason, DisconnectReason::ProbeFailed);
        assert!(log.is_closed());
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_probe_times_out() {
        let registry = Arc::new(ClientRegistry::new());
        let (sink, _log) = RecordingSink::new(SinkMode::Stalled);
        let (source, _peer) = ChannelSource::new();

        let started = Instant::now();
        let summary = serve_client(&registry, sink, source, &config(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.reason, DisconnectReason::ProbeFailed);
        assert!(started.elapsed() <= Duration::from_secs(32));
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_ends_session() {
        let registry = Arc::new(ClientRegistry::new());
        let (sink, log) = RecordingSink::healthy();
        let (source, _peer) = ChannelSource::new();

        let task = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                serve_client(&registry, sink, source, &config(), CancellationToken::new()).await
            })
        };

        let id = wait_registered(&registry).await;
        assert!(registry.remove(id).await);

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.reason, DisconnectReason::Evicted);
        assert_eq!(summary.client_id, id);
        assert!(log.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_session() {
        let registry = Arc::new(ClientRegistry::new());
        let (sink, log) = RecordingSink::healthy();
        let (source, _peer) = ChannelSource::new();
        let shutdown = CancellationToken::new();

        let task = {
            let registry = Arc::clone(&registry);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { serve_client(&registry, sink, source, &config(), shutdown).await })
        };

        wait_registered(&registry).await;
        shutdown.cancel();

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.reason, DisconnectReason::Shutdown);
        assert!(log.is_closed());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_closed_registry_rejects_client() {
        let registry = ClientRegistry::new();
        registry.close_all().await;

        let (sink, _log) = RecordingSink::healthy();
        let (source, _peer) = ChannelSource::new();
        let result = serve_client(&registry, sink, source, &config(), CancellationToken::new()).await;

        assert!(matches!(result, Err(RegistryError::Closed)));
    }
}
