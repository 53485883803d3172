//! Client sessions
//!
//! This module provides:
//! - The connection halves a transport hands over ([`ClientSink`], [`ClientSource`])
//! - The per-client lifecycle task (registration, keepalive, removal)

pub mod connection;
pub mod lifecycle;

pub use connection::{ClientSink, ClientSource};
pub use lifecycle::{serve_client, DisconnectReason, LifecycleConfig, SessionSummary};
