//! Client registry implementation
//!
//! The set of connected subscribers. Guarded by a `RwLock`: broadcast passes
//! take a read lock only long enough to copy a snapshot of the handles, while
//! `add`/`remove` take the write lock. Client identifiers are assigned under
//! the write lock and strictly increase.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::RwLock;

use super::entry::ClientHandle;
use super::error::RegistryError;
use super::frame::ClientId;
use crate::session::ClientSink;

/// Deadline for closing a removed client's connection
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Registry of connected clients
pub struct ClientRegistry<S> {
    clients: RwLock<HashMap<ClientId, Arc<ClientHandle<S>>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<S: ClientSink> ClientRegistry<S> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a client and assign it the next identifier
    ///
    /// Fails once the registry has been closed.
    pub async fn add(&self, sink: S) -> Result<Arc<ClientHandle<S>>, RegistryError> {
        let mut clients = self.clients.write().await;

        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed);
        }

        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(ClientHandle::new(id, sink));
        clients.insert(id, Arc::clone(&handle));

        tracing::info!(client_id = %id, clients = clients.len(), "Client connected");

        Ok(handle)
    }

    /// Remove a client and close its connection
    ///
    /// Idempotent: removing an unknown or already-removed client is a no-op.
    /// Returns whether a client was actually removed.
    pub async fn remove(&self, id: ClientId) -> bool {
        let removed = {
            let mut clients = self.clients.write().await;
            let removed = clients.remove(&id);
            if removed.is_some() {
                tracing::info!(client_id = %id, clients = clients.len(), "Client disconnected");
            }
            removed
        };

        match removed {
            Some(handle) => {
                handle.mark_removed();
                if let Err(e) = handle.close(CLOSE_TIMEOUT).await {
                    tracing::debug!(client_id = %id, error = %e, "Error closing client connection");
                }
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of the registered clients
    ///
    /// The copy can be iterated freely while other tasks add or remove
    /// clients.
    pub async fn snapshot(&self) -> Vec<Arc<ClientHandle<S>>> {
        self.clients.read().await.values().cloned().collect()
    }

    /// Look up a client
    pub async fn get(&self, id: ClientId) -> Option<Arc<ClientHandle<S>>> {
        self.clients.read().await.get(&id).cloned()
    }

    /// Number of registered clients
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether no clients are registered
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Whether the registry has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the registry: refuse new clients and close all current ones
    ///
    /// Returns the number of clients that were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut clients = self.clients.write().await;
            self.closed.store(true, Ordering::Release);
            clients.drain().map(|(_, handle)| handle).collect()
        };

        let count = drained.len();
        for handle in &drained {
            handle.mark_removed();
        }
        close_handles(drained, CLOSE_TIMEOUT).await;

        if count > 0 {
            tracing::info!(clients = count, "Closed all clients");
        }

        count
    }

    /// Remove a batch of clients under one write lock
    ///
    /// The removed connections are closed concurrently on a background task,
    /// each bounded by `close_deadline`, so the caller never waits on a peer.
    /// Unknown ids are skipped. Returns the number of clients removed.
    pub async fn evict(&self, ids: &[ClientId], close_deadline: Duration) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let removed: Vec<_> = {
            let mut clients = self.clients.write().await;
            let removed: Vec<_> = ids.iter().filter_map(|id| clients.remove(id)).collect();
            if !removed.is_empty() {
                tracing::info!(evicted = removed.len(), clients = clients.len(), "Clients evicted");
            }
            removed
        };

        let count = removed.len();
        if count == 0 {
            return 0;
        }

        for handle in &removed {
            handle.mark_removed();
        }
        tokio::spawn(close_handles(removed, close_deadline));

        count
    }
}

/// Close connections concurrently, each under its own deadline
async fn close_handles<S: ClientSink>(handles: Vec<Arc<ClientHandle<S>>>, deadline: Duration) {
    let closes = handles.into_iter().map(|handle| async move {
        if let Err(e) = handle.close(deadline).await {
            tracing::debug!(client_id = %handle.id(), error = %e, "Error closing client connection");
        }
    });
    join_all(closes).await;
}

impl<S: ClientSink> Default for ClientRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
