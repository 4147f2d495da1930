//! Worker WebSocket endpoint
//!
//! Each upgraded socket is split and adapted into a [`Transport`]: text (or
//! UTF-8 binary) messages decode into frames, outbound frames encode as JSON
//! text. A close message ends the stream. The gateway owns the connection
//! from there.

use std::net::SocketAddr;
use std::sync::Arc;

use agentgate_core::Frame;
use agentgate_runtime::{Gateway, Transport, TransportError};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::ConnectInfo,
    response::IntoResponse,
    Extension,
};
use futures::{future, SinkExt, StreamExt};
use tracing::{info, warn};

/// Upgrade limits, taken from `[server]`
#[derive(Debug, Clone, Copy)]
pub struct SocketLimits {
    pub max_message_bytes: usize,
}

/// `GET /ws/agents`
pub async fn agents_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Extension(gateway): Extension<Arc<Gateway>>,
    Extension(limits): Extension<SocketLimits>,
) -> impl IntoResponse {
    ws.max_message_size(limits.max_message_bytes)
        .on_upgrade(move |socket| attach(socket, peer, gateway))
}

async fn attach(socket: WebSocket, peer: SocketAddr, gateway: Arc<Gateway>) {
    match gateway.accept(socket_transport(socket, peer)).await {
        Ok(conn_id) => info!(conn_id = %conn_id, peer = %peer, "Worker WebSocket attached"),
        Err(e) => warn!(peer = %peer, error = %e, "Worker WebSocket rejected"),
    }
}

/// Adapt an upgraded socket into a frame transport.
pub fn socket_transport(socket: WebSocket, peer: SocketAddr) -> Transport {
    let (sink, stream) = socket.split();

    let reader = stream
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| future::ready(decode_message(msg)));

    let writer = sink
        .sink_map_err(|e| TransportError::Io(e.to_string()))
        .with(|frame: Frame| future::ready(encode_frame(&frame)));

    Transport::new(reader, writer).with_peer(peer.to_string())
}

fn decode_message(msg: Result<Message, axum::Error>) -> Option<Result<Frame, TransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(decode_text(&text)),
        Ok(Message::Binary(bytes)) => Some(
            std::str::from_utf8(&bytes)
                .map_err(|e| TransportError::Decode(e.to_string()))
                .and_then(decode_text),
        ),
        // pings are answered by axum
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Close(_)) => None,
        Err(e) => Some(Err(TransportError::Io(e.to_string()))),
    }
}

fn decode_text(text: &str) -> Result<Frame, TransportError> {
    Frame::from_json(text).map_err(|e| TransportError::Decode(e.to_string()))
}

fn encode_frame(frame: &Frame) -> Result<Message, TransportError> {
    frame
        .to_json()
        .map(Message::Text)
        .map_err(|e| TransportError::Io(e.to_string()))
}
