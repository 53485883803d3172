//! Client connection boundary
//!
//! The relay does not perform the transport handshake itself. Whatever
//! produces a connection (the WebSocket upgrade in `server::ws`, or a test
//! double) hands over two halves:
//!
//! - a [`ClientSink`], owned by the registry and written by both the broadcast
//!   engine and the keepalive loop, always under a per-client lock
//! - a [`ClientSource`], read only by the lifecycle manager to notice when
//!   the peer goes away

use std::future::Future;

use bytes::Bytes;

use crate::error::ConnectionError;

/// Write half of a client connection
pub trait ClientSink: Send + 'static {
    /// Send one binary message (a frame)
    fn write_binary(&mut self, data: Bytes) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Send a payload-less liveness probe
    fn write_ping(&mut self) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Close the connection
    fn close(&mut self) -> impl Future<Output = Result<(), ConnectionError>> + Send;
}

/// Read half of a client connection
pub trait ClientSource: Send + 'static {
    /// Wait for the next inbound message
    ///
    /// Message contents are ignored. Returns an error once the peer has
    /// disconnected, including an orderly close.
    fn read_message(&mut self) -> impl Future<Output = Result<(), ConnectionError>> + Send;
}
