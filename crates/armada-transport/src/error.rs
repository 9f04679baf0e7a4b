//! Transport-level errors.

use std::io;

/// Errors from the WebSocket transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the listening socket.
    #[error("bind failed: {0}")]
    Bind(#[source] io::Error),

    /// Failed to accept an incoming TCP connection.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The WebSocket handshake with a client failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),

    /// An established connection errored while sending or receiving.
    #[error("connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),
}
