//! WebSocket transport for Armada.
//!
//! [`WsListener`] accepts incoming TCP connections and upgrades them to
//! WebSocket. Each accepted connection becomes a [`WsConnection`] that the
//! server reads envelopes from and writes envelopes to as raw byte frames.
//! Nothing here knows about the protocol or rooms; this layer moves bytes.

mod error;
mod websocket;

pub use error::TransportError;
pub use websocket::{ConnectionId, WsConnection, WsListener};
