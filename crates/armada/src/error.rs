//! Top-level error type for the server.

use armada_protocol::ProtocolError;
use armada_room::RoomError;
use armada_transport::TransportError;

/// Any error the server surfaces, wrapping the per-layer types.
#[derive(Debug, thiserror::Error)]
pub enum ArmadaError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Room(#[from] RoomError),
}
