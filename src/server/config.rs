//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// HTTP/WebSocket server options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Route that upgrades to the frame WebSocket
    pub ws_path: String,

    /// Route answering liveness checks
    pub health_path: String,

    /// How long to wait for open requests after shutdown begins
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_path: "/ws".to_string(),
            health_path: "/health".to_string(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the WebSocket route
    pub fn ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = normalize_path(path.into());
        self
    }

    /// Set the health route
    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = normalize_path(path.into());
        self
    }

    /// Set the shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}
