//! Connection-level errors.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;
use wadash_protocol::PacketError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid backend url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    #[error("no handshake from server within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("server refused namespace {namespace}: {message}")]
    ConnectRefused { namespace: String, message: String },

    #[error("connection closed during handshake")]
    ClosedDuringHandshake,

    #[error("unexpected frame during handshake: {0}")]
    UnexpectedFrame(String),

    #[error(transparent)]
    Packet(#[from] PacketError),
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        ClientError::WebSocket(Box::new(err))
    }
}
