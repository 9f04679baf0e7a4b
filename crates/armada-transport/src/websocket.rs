//! WebSocket listener and connection types.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::debug;

use crate::TransportError;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a single accepted connection, for logging and bookkeeping.
///
/// Distinct from any protocol-level client identity: a connection gets an
/// id the moment it is accepted, before it has said anything at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Listens for TCP connections and upgrades them to WebSocket.
pub struct WsListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl WsListener {
    /// Binds to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        let local_addr = listener.local_addr().map_err(TransportError::Bind)?;
        debug!(%local_addr, "transport listening");
        Ok(Self { listener, local_addr })
    }

    /// The address the listener is actually bound to. Useful when binding
    /// to port 0 in tests.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts the next connection and performs the WebSocket handshake.
    pub async fn accept(&self) -> Result<WsConnection, TransportError> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        let ws = accept_async(stream)
            .await
            .map_err(TransportError::Handshake)?;
        let id = ConnectionId::next();
        debug!(connection_id = %id, %peer_addr, "connection accepted");
        Ok(WsConnection { id, ws, peer_addr })
    }
}

/// An accepted WebSocket connection.
///
/// Can be used directly via [`send`](WsConnection::send) and
/// [`recv`](WsConnection::recv), or split into independent halves with
/// [`split`](WsConnection::split) so one task writes while another reads.
pub struct WsConnection {
    id: ConnectionId,
    ws: WebSocketStream<TcpStream>,
    peer_addr: SocketAddr,
}

impl WsConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Splits the connection into a write half and a read half.
    pub fn split(self) -> (WsSender, WsReceiver) {
        let (sink, stream) = self.ws.split();
        (
            WsSender { id: self.id, sink },
            WsReceiver { id: self.id, stream },
        )
    }

    /// Sends a single frame.
    pub async fn send(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.ws.send(frame(data)).await?;
        Ok(())
    }

    /// Receives the next data frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection. Control
    /// frames are handled internally and never surface here.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(msg)) => {
                    if let Some(data) = data_frame(msg) {
                        return Ok(Some(data));
                    }
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// The write half of a split connection.
pub struct WsSender {
    id: ConnectionId,
    sink: SplitSink<WebSocketStream<TcpStream>, Message>,
}

impl WsSender {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn send(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.sink.send(frame(data)).await?;
        Ok(())
    }

    /// Sends a close frame and flushes.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.send(Message::Close(None)).await?;
        Ok(())
    }
}

/// The read half of a split connection.
pub struct WsReceiver {
    id: ConnectionId,
    stream: SplitStream<WebSocketStream<TcpStream>>,
}

impl WsReceiver {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receives the next data frame, `Ok(None)` on clean close.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(msg)) => {
                    if let Some(data) = data_frame(msg) {
                        return Ok(Some(data));
                    }
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// Wraps outgoing bytes in a frame. The protocol is JSON, so data is sent
/// as text when it is valid UTF-8, falling back to a binary frame.
fn frame(data: Vec<u8>) -> Message {
    match String::from_utf8(data) {
        Ok(text) => Message::Text(text.into()),
        Err(raw) => Message::Binary(raw.into_bytes().into()),
    }
}

/// Extracts the payload of a data frame, dropping control frames.
/// Pings are answered automatically by tungstenite on the next read or
/// write, so there is nothing to do for them here.
fn data_frame(msg: Message) -> Option<Vec<u8>> {
    match msg {
        Message::Text(text) => Some(text.as_bytes().to_vec()),
        Message::Binary(data) => Some(data.to_vec()),
        _ => None,
    }
}
