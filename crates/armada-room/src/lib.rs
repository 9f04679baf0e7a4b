//! The Armada session and game engine.
//!
//! This crate is fully independent of the network layer: a
//! [`RoomClient`] is just an id, a name, and an outbound envelope
//! channel, so the whole room system can be driven and observed in tests
//! without a socket in sight.
//!
//! - [`Registry`] owns the room namespace and allocates client ids.
//! - [`Room`] handles membership, chat relay, and broadcast with
//!   fail-fast eviction; game rooms additionally run the ready check,
//!   the READY → PLACE → ATTACK phase machine, turn order, and timers.
//! - [`Grid`] and [`User`] are the pure data model underneath.

mod client;
mod error;
mod game;
mod grid;
mod registry;
mod room;
mod user;

pub use client::RoomClient;
pub use error::RoomError;
pub use game::{GRID_COLS, GRID_ROWS, MAX_ROUNDS, READY_QUORUM, WINNING_POINTS};
pub use grid::{AttackOutcome, Cell, CellStatus, Grid};
pub use registry::{LOBBY_ROOM, MAX_ROOM_RESULTS, Registry};
pub use room::Room;
pub use user::{MAX_SHIPS, User};
