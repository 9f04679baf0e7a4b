//! Wire protocol for Armada.
//!
//! This crate defines the language clients and the server speak:
//!
//! - **Types** ([`Envelope`], [`PayloadKind`], [`ClientId`], [`Phase`],
//!   [`TimerType`]): the structures that travel on the wire.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how they become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer sits between transport (raw frames) and the room
//! engine. It knows nothing about connections, rooms, or game state,
//! only how to describe them on the wire.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{ClientId, Envelope, PayloadKind, Phase, TimerType};
