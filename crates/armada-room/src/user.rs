//! Per-client session state.

/// Ships each player may place per session.
pub const MAX_SHIPS: u32 = 5;

/// The mutable game-facing state of one connected client.
///
/// Created at handshake and kept for the life of the connection; leaving a
/// room or ending a session resets it rather than destroying it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct User {
    pub ready: bool,
    pub took_turn: bool,
    pub points: u32,
    pub placed_ships: u32,
}

impl User {
    /// Clears all session state back to initial values.
    pub fn reset(&mut self) {
        *self = User::default();
    }

    /// Whether this user has placed every ship it is entitled to.
    pub fn all_ships_placed(&self) -> bool {
        self.placed_ships >= MAX_SHIPS
    }
}
