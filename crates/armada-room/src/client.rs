//! The room-facing handle for one connected client.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use armada_protocol::{ClientId, Envelope, PayloadKind, Phase};
use tokio::sync::mpsc;

use crate::room::Room;
use crate::user::User;

/// One connected client, as the room layer sees it.
///
/// Outbound traffic goes through an unbounded channel whose receiving end
/// is pumped into the client's socket by the connection handler. A failed
/// send means the pump is gone, which is the single eviction signal used
/// by every broadcast path.
pub struct RoomClient {
    id: ClientId,
    name: String,
    outbound: mpsc::UnboundedSender<Envelope>,
    room: Mutex<Weak<Room>>,
    user: Mutex<User>,
}

impl RoomClient {
    pub fn new(id: ClientId, name: impl Into<String>, outbound: mpsc::UnboundedSender<Envelope>) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            outbound,
            room: Mutex::new(Weak::new()),
            user: Mutex::new(User::default()),
        })
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// How this client is shown to other members, e.g. `alice#1`.
    pub fn display_name(&self) -> String {
        format!("{}#{}", self.name, self.id)
    }

    /// The room this client currently belongs to, if any.
    pub fn room(&self) -> Option<Arc<Room>> {
        self.room
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    pub(crate) fn set_room(&self, room: Weak<Room>) {
        *self.room.lock().unwrap_or_else(PoisonError::into_inner) = room;
    }

    pub(crate) fn clear_room(&self) {
        *self.room.lock().unwrap_or_else(PoisonError::into_inner) = Weak::new();
    }

    pub(crate) fn user(&self) -> std::sync::MutexGuard<'_, User> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an envelope for delivery. Returns `false` if the client's
    /// writer is gone, in which case the caller should evict the client.
    pub fn send(&self, envelope: Envelope) -> bool {
        self.outbound.send(envelope).is_ok()
    }

    /// Plain server-originated text, used for error and status replies
    /// addressed to this client alone.
    pub fn send_message(&self, text: impl Into<String>) -> bool {
        self.send(Envelope::server(PayloadKind::Message).with_message(text))
    }

    /// One entry of the membership sync shown to a newcomer; `None`
    /// tells the client to clear its local member list first.
    pub(crate) fn send_sync_client(&self, member: ClientId, name: Option<String>) -> bool {
        self.send(Envelope::from_client(member, PayloadKind::SyncClient { name }))
    }

    pub(crate) fn send_phase(&self, phase: Phase) -> bool {
        self.send(Envelope::server(PayloadKind::Phase { phase }))
    }

    pub(crate) fn send_sync_ready(&self, member: ClientId, ready: bool) -> bool {
        self.send(Envelope::from_client(member, PayloadKind::SyncReady { ready }))
    }

    pub(crate) fn send_sync_turn(&self, member: ClientId, took_turn: bool) -> bool {
        self.send(Envelope::from_client(member, PayloadKind::SyncTurn { took_turn }))
    }

    pub(crate) fn send_points(&self, member: ClientId, points: u32) -> bool {
        self.send(Envelope::from_client(member, PayloadKind::Points { points }))
    }
}

impl std::fmt::Debug for RoomClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomClient")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
