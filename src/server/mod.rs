//! HTTP and WebSocket front end
//!
//! - `GET /ws` upgrades to a WebSocket; each frame arrives as one binary message
//! - `GET /health` returns `OK`

pub mod config;
pub mod listener;
pub mod ws;

pub use config::ServerConfig;
pub use listener::RelayServer;
pub use ws::{split_socket, WsSink, WsSource};
