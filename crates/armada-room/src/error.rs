//! Error types for the room layer.
//!
//! Game-rule violations double as the text sent back to the offending
//! client, so the `#[error]` messages are written for players, not logs.

use armada_protocol::Phase;

/// Errors from registry operations and game actions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    /// A room with this name already exists (names are case-insensitive).
    #[error("a room named '{0}' already exists")]
    DuplicateRoom(String),

    /// No room with this name exists.
    #[error("no room named '{0}' was found")]
    RoomNotFound(String),

    /// The room has been closed and accepts no new members.
    #[error("the room '{0}' is closed")]
    RoomClosed(String),

    /// The client is already a member of this room.
    #[error("you are already in the room '{0}'")]
    AlreadyInRoom(String),

    /// A game action was sent to a room without game state (the lobby).
    #[error("you are not in a game room")]
    NotGameRoom,

    /// The acting client is not a member of this room.
    #[error("you are not a player in this room")]
    PlayerNotFound,

    /// The action is not legal in the current phase.
    #[error("that action is not allowed during the {0} phase")]
    PhaseMismatch(Phase),

    /// The acting client never readied up for this session.
    #[error("you are not marked ready for this session")]
    NotReady,

    /// It is another player's turn.
    #[error("it is not your turn")]
    NotPlayersTurn,

    /// The acting client already took its turn this round.
    #[error("you already took your turn this round")]
    AlreadyTookTurn,

    /// The coordinate is outside the grid (or there is no grid).
    #[error("coordinate ({0}, {1}) is not on the board")]
    InvalidCoordinate(u32, u32),
}
