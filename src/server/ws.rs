//! WebSocket connection adapter
//!
//! Splits an upgraded axum socket into the two connection halves the relay
//! works with. Frames go out as binary messages, keepalives as ping control
//! frames. Incoming messages are read only to notice the peer leaving.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use crate::error::ConnectionError;
use crate::session::{ClientSink, ClientSource};

/// Write half of a client WebSocket
pub struct WsSink(SplitSink<WebSocket, Message>);

/// Read half of a client WebSocket
pub struct WsSource(SplitStream<WebSocket>);

/// Split an upgraded socket
pub fn split_socket(socket: WebSocket) -> (WsSink, WsSource) {
    let (sink, stream) = socket.split();
    (WsSink(sink), WsSource(stream))
}

impl ClientSink for WsSink {
    async fn write_binary(&mut self, data: Bytes) -> Result<(), ConnectionError> {
        self.0
            .send(Message::Binary(data))
            .await
            .map_err(ConnectionError::transport)
    }

    async fn write_ping(&mut self) -> Result<(), ConnectionError> {
        self.0
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(ConnectionError::transport)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.0.close().await.map_err(ConnectionError::transport)
    }
}

impl ClientSource for WsSource {
    async fn read_message(&mut self) -> Result<(), ConnectionError> {
        match self.0.next().await {
            Some(Ok(Message::Close(_))) | None => Err(ConnectionError::Closed),
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(ConnectionError::transport(e)),
        }
    }
}
