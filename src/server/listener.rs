//! Relay HTTP server
//!
//! Serves the WebSocket upgrade route, which hands each socket to the
//! pipeline's lifecycle manager, plus a static health check.

use std::future::IntoFuture;
use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::config::ServerConfig;
use super::ws::{split_socket, WsSink};
use crate::error::Result;
use crate::pipeline::PipelineHandle;

/// WebSocket relay server
pub struct RelayServer {
    config: ServerConfig,
    pipeline: PipelineHandle<WsSink>,
}

impl RelayServer {
    /// Create a server feeding clients from `pipeline`
    pub fn new(config: ServerConfig, pipeline: PipelineHandle<WsSink>) -> Self {
        Self { config, pipeline }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.ws_path, get(ws_handler))
            .route(&self.config.health_path, get(health_handler))
            .with_state(self.pipeline.clone())
    }

    /// Bind the configured address and serve until `shutdown` is cancelled
    pub async fn run_until(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled
    ///
    /// After cancellation, open requests get the configured grace period.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            ws = %self.config.ws_path,
            health = %self.config.health_path,
            "Relay server listening"
        );

        let server = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future();

        let grace = self.config.shutdown_grace;
        let deadline = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            result = server => result?,
            _ = deadline => {
                tracing::warn!(grace_ms = grace.as_millis() as u64, "Grace period elapsed, stopping server");
            }
        }

        tracing::info!(addr = %addr, "Relay server stopped");
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(pipeline): State<PipelineHandle<WsSink>>) -> Response {
    if pipeline.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    ws.on_upgrade(move |socket| async move {
        let (sink, source) = split_socket(socket);
        match pipeline.serve_client(sink, source).await {
            Ok(summary) => {
                tracing::debug!(
                    client_id = %summary.client_id,
                    reason = %summary.reason,
                    "WebSocket session closed"
                );
            }
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket client rejected");
            }
        }
    })
}

async fn health_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::pipeline::{Pipeline, PipelineConfig};
    use crate::registry::Frame;

    async fn start_server(
        pipeline: &Pipeline<WsSink>,
    ) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let server = RelayServer::new(
            ServerConfig::with_addr(addr).shutdown_grace(Duration::from_millis(200)),
            pipeline.handle(),
        );
        let token = shutdown.clone();
        let task = tokio::spawn(async move { server.serve(listener, token).await });

        (addr, shutdown, task)
    }

    async fn read_headers(stream: &mut TcpStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            stream.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let pipeline: Pipeline<WsSink> = Pipeline::new(PipelineConfig::default());
        let (addr, shutdown, task) = start_server(&pipeline).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("OK"));

        shutdown.cancel();
        task.await.unwrap().unwrap();
        pipeline.join().await;
    }

    #[tokio::test]
    async fn test_websocket_receives_binary_frame() {
        let pipeline: Pipeline<WsSink> = Pipeline::new(PipelineConfig::default());
        let (addr, shutdown, task) = start_server(&pipeline).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"GET /ws HTTP/1.1\r\n\
                  Host: localhost\r\n\
                  Upgrade: websocket\r\n\
                  Connection: Upgrade\r\n\
                  Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                  Sec-WebSocket-Version: 13\r\n\r\n",
            )
            .await
            .unwrap();

        let head = read_headers(&mut stream).await;
        assert!(head.starts_with("HTTP/1.1 101"));

        while pipeline.registry().is_empty().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let frame = Frame::from(vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        let pass = pipeline.engine().broadcast_frame(&frame).await;
        assert_eq!(pass.delivered, 1);

        // Unmasked server frame: FIN + binary opcode, 6-byte payload
        let mut ws_frame = [0u8; 8];
        stream.read_exact(&mut ws_frame).await.unwrap();
        assert_eq!(ws_frame[0], 0x82);
        assert_eq!(ws_frame[1], 6);
        assert_eq!(&ws_frame[2..], frame.data().as_ref());

        pipeline.shutdown();
        shutdown.cancel();
        task.await.unwrap().unwrap();
        pipeline.join().await;
    }
}
