//! Core protocol types for Armada's wire format.
//!
//! Every message exchanged between a client and the server is an
//! [`Envelope`]: a sender id, an optional free-text message, and a typed
//! payload. Both directions share the same schema, so a client can decode
//! everything the server broadcasts with the one enum below.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A server-assigned client identifier.
///
/// Assigned ids are strictly increasing, start at 1, and are never reused
/// within a process lifetime. Negative values are reserved sentinels for
/// server-originated traffic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub i64);

impl ClientId {
    /// Sentinel for "no client": server-generated messages and unset state.
    pub const NONE: ClientId = ClientId(-1);

    /// Sentinel sender for game narration (round/turn/hit announcements),
    /// so clients can route those to a dedicated events view.
    pub const GAME_EVENT: ClientId = ClientId(-2);

    /// Returns `true` if this is a real, server-assigned id.
    pub fn is_assigned(self) -> bool {
        self.0 >= 1
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Game enums shared across the wire
// ---------------------------------------------------------------------------

/// The phase of a game session. Gates which actions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Waiting for players to ready up.
    Ready,
    /// Players are placing ships on the grid.
    Place,
    /// Players take aimed shots in turn order.
    Attack,
    /// Generic-turn demo mode (no grid, random points).
    InProgress,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Ready => "READY",
            Phase::Place => "PLACE",
            Phase::Attack => "ATTACK",
            Phase::InProgress => "IN_PROGRESS",
        };
        write!(f, "{name}")
    }
}

/// Which server-side countdown a `Time` envelope refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerType {
    Ready,
    Round,
    Turn,
}

// ---------------------------------------------------------------------------
// PayloadKind: the closed tag set
// ---------------------------------------------------------------------------

/// The typed payload of an [`Envelope`], tagged with `"type"` in JSON.
///
/// A few tags travel in both directions with different fields populated:
/// `RoomJoin`/`RoomLeave` carry `room` in requests and the affected
/// member's `name` in notifications; `RoomList` carries `query` in the
/// request and `rooms` in the response. Unused optional fields are
/// omitted from the JSON entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadKind {
    /// Client → server handshake: the client-chosen display name.
    ClientConnect { name: String },

    /// Server → client, sent once post-handshake. `sender_id` is the
    /// assigned id; `name` echoes the (possibly server-adjusted) name.
    ClientId { name: String },

    /// Explicit disconnect, either direction.
    Disconnect,

    /// Chat text (in the envelope `message` field).
    Message,

    /// Relay the text reversed.
    Reverse,

    /// Create a room and move the sender into it.
    RoomCreate { room: String },

    /// Request: join `room`. Notification: `sender_id`/`name` joined.
    RoomJoin {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Request: back to the lobby. Notification: `sender_id`/`name` left.
    RoomLeave {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Request: rooms matching `query`. Response: the matching names.
    RoomList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rooms: Vec<String>,
    },

    /// Silent membership sync of one existing member to a newcomer.
    /// `name: None` tells the client to clear its local member list.
    SyncClient {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Ready toggle (request) / one member's ready change (broadcast).
    Ready { ready: bool },

    /// Quiet ready sync for clients joining mid-state.
    SyncReady { ready: bool },

    /// Tell clients to clear every member's local ready flag.
    ResetReady,

    /// Current session phase.
    Phase { phase: Phase },

    /// Demo-mode turn action (request) / turn-status change (broadcast).
    Turn { took_turn: bool },

    /// Quiet turn-status sync for clients joining mid-state.
    SyncTurn { took_turn: bool },

    /// Tell clients to clear every member's local turn flag.
    ResetTurn,

    /// Remaining seconds of a server countdown; -1 clears the display.
    Time { timer: TimerType, seconds: i64 },

    /// Place a ship at the coordinate (PLACE phase).
    Place { row: u32, col: u32 },

    /// Attack the coordinate (ATTACK phase).
    Attack { row: u32, col: u32 },

    /// Pass the current turn (ATTACK phase).
    Skip,

    /// One member's current point total.
    Points { points: u32 },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The unit of wire communication.
///
/// The payload tag is flattened into the envelope object, so the JSON is
/// flat: `{"sender_id":-1,"type":"PHASE","phase":"PLACE"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Who this envelope is from/about. [`ClientId::NONE`] for
    /// server-originated traffic with no subject.
    #[serde(default = "ClientId::none")]
    pub sender_id: ClientId,

    /// Optional free text (chat lines, notices, error explanations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The typed payload.
    #[serde(flatten)]
    pub kind: PayloadKind,
}

impl ClientId {
    fn none() -> Self {
        Self::NONE
    }
}

impl Envelope {
    /// An envelope originated by the server itself.
    pub fn server(kind: PayloadKind) -> Self {
        Self {
            sender_id: ClientId::NONE,
            message: None,
            kind,
        }
    }

    /// An envelope from/about a specific client.
    pub fn from_client(sender_id: ClientId, kind: PayloadKind) -> Self {
        Self {
            sender_id,
            message: None,
            kind,
        }
    }

    /// Attaches free text to the envelope.
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        self.message = Some(text.into());
        self
    }
}

// =========================================================================
// Tests
// =========================================================================
