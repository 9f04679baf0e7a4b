//! Rooms: named groups of clients with broadcast, membership sync, and
//! an optional game extension.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use armada_protocol::{ClientId, Envelope, PayloadKind, Phase};
use tracing::{info, warn};

use crate::client::RoomClient;
use crate::game::GameState;
use crate::registry::{LOBBY_ROOM, Registry};
use crate::RoomError;

/// What a room is for. The lobby is `Plain`; every user-created room
/// carries game state.
pub(crate) enum RoomKind {
    Plain,
    Game(GameState),
}

/// Mutable room state, guarded by the room's lock. All structural and
/// game mutations are serialized through it, which is what linearizes
/// concurrent joins, broadcasts, and timer callbacks.
pub(crate) struct RoomState {
    pub(crate) running: bool,
    pub(crate) members: BTreeMap<ClientId, Arc<RoomClient>>,
    pub(crate) kind: RoomKind,
}

impl RoomState {
    pub(crate) fn game(&self) -> Option<&GameState> {
        match &self.kind {
            RoomKind::Game(game) => Some(game),
            RoomKind::Plain => None,
        }
    }

    pub(crate) fn game_mut(&mut self) -> Option<&mut GameState> {
        match &mut self.kind {
            RoomKind::Game(game) => Some(game),
            RoomKind::Plain => None,
        }
    }
}

/// A named, addressable group of connected clients.
pub struct Room {
    name: String,
    registry: Weak<Registry>,
    self_weak: Weak<Room>,
    state: Mutex<RoomState>,
}

impl Room {
    pub(crate) fn new(name: &str, kind: RoomKind, registry: Weak<Registry>) -> Arc<Self> {
        Arc::new_cyclic(|self_weak| Self {
            name: name.to_string(),
            registry,
            self_weak: self_weak.clone(),
            state: Mutex::new(RoomState {
                running: true,
                members: BTreeMap::new(),
                kind,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_lobby(&self) -> bool {
        self.name.eq_ignore_ascii_case(LOBBY_ROOM)
    }

    pub fn member_count(&self) -> usize {
        self.state().members.len()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.state().members.contains_key(&id)
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// Current game phase, `None` for plain rooms.
    pub fn phase(&self) -> Option<Phase> {
        self.state().game().map(|game| game.phase)
    }

    /// Whose turn it is, when a turn-based phase is underway.
    pub fn current_turn(&self) -> Option<ClientId> {
        self.state()
            .game()
            .map(|game| game.current_turn)
            .filter(|id| id.is_assigned())
    }

    pub(crate) fn weak(&self) -> Weak<Room> {
        self.self_weak.clone()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    /// Adds a client: the newcomer gets a membership sync (clear, then
    /// one entry per existing member), then everyone including the
    /// newcomer is told about the join.
    pub fn add_client(&self, client: &Arc<RoomClient>) -> Result<(), RoomError> {
        let mut state = self.state();
        if !state.running {
            return Err(RoomError::RoomClosed(self.name.clone()));
        }
        if state.members.contains_key(&client.id()) {
            return Err(RoomError::AlreadyInRoom(self.name.clone()));
        }

        client.send_sync_client(ClientId::NONE, None);
        for (id, member) in &state.members {
            client.send_sync_client(*id, Some(member.display_name()));
        }

        state.members.insert(client.id(), client.clone());
        client.set_room(self.self_weak.clone());

        let notice = Envelope::from_client(
            client.id(),
            PayloadKind::RoomJoin {
                room: None,
                name: Some(client.display_name()),
            },
        )
        .with_message(format!(
            "{} joined the room {}",
            client.display_name(),
            self.name
        ));
        self.broadcast_locked(&mut state, &notice);

        self.sync_game_state_locked(&mut state, client);
        info!(room = %self.name, client_id = %client.id(), "client joined");
        Ok(())
    }

    /// Removes a client that is leaving voluntarily (switching rooms).
    pub fn remove_client(&self, client: &Arc<RoomClient>) {
        let notice = Envelope::from_client(
            client.id(),
            PayloadKind::RoomLeave {
                name: Some(client.display_name()),
            },
        )
        .with_message(format!(
            "{} left the room {}",
            client.display_name(),
            self.name
        ));
        self.remove_with_notice(client, notice);
    }

    /// Removes a client whose connection is gone.
    pub fn handle_disconnect(&self, client: &Arc<RoomClient>) {
        let notice = Envelope::from_client(client.id(), PayloadKind::Disconnect)
            .with_message(format!("{} disconnected", client.display_name()));
        self.remove_with_notice(client, notice);
    }

    fn remove_with_notice(&self, client: &Arc<RoomClient>, notice: Envelope) {
        let mut state = self.state();
        if state.members.remove(&client.id()).is_none() {
            return;
        }
        client.clear_room();
        client.user().reset();
        self.broadcast_locked(&mut state, &notice);
        self.on_client_removed_locked(&mut state, client.id());
        self.maybe_close_locked(&mut state);
        info!(room = %self.name, client_id = %client.id(), "client removed");
    }

    /// Disconnects every member, used at process shutdown. Best effort;
    /// a failed send here is simply ignored.
    pub fn disconnect_all(&self) {
        let members: Vec<Arc<RoomClient>> = {
            let mut state = self.state();
            state.running = false;
            if let Some(game) = state.game_mut() {
                game.cancel_timers();
            }
            std::mem::take(&mut state.members).into_values().collect()
        };
        for client in members {
            client.clear_room();
            client.user().reset();
            client.send(
                Envelope::server(PayloadKind::Disconnect)
                    .with_message("the server is shutting down"),
            );
        }
        info!(room = %self.name, "disconnected all members");
    }

    // -----------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------

    /// Relays a chat line from this client to every member.
    pub fn handle_message(&self, client: &Arc<RoomClient>, text: &str) -> Result<(), RoomError> {
        let mut state = self.state();
        if !state.members.contains_key(&client.id()) {
            return Err(RoomError::PlayerNotFound);
        }
        self.relay_locked(&mut state, Some(client), text);
        Ok(())
    }

    /// Relays the client's text reversed.
    pub fn handle_reverse(&self, client: &Arc<RoomClient>, text: &str) -> Result<(), RoomError> {
        let reversed: String = text.chars().rev().collect();
        self.handle_message(client, &reversed)
    }

    /// Formats and broadcasts a chat line. `None` sender marks the line
    /// as room-originated.
    pub fn relay(&self, sender: Option<&Arc<RoomClient>>, text: &str) {
        let mut state = self.state();
        self.relay_locked(&mut state, sender, text);
    }

    pub(crate) fn relay_locked(
        &self,
        state: &mut RoomState,
        sender: Option<&Arc<RoomClient>>,
        text: &str,
    ) {
        let (sender_id, line) = match sender {
            Some(client) => (client.id(), format!("{}: {}", client.display_name(), text)),
            None => (ClientId::NONE, format!("Room[{}]: {}", self.name, text)),
        };
        let envelope =
            Envelope::from_client(sender_id, PayloadKind::Message).with_message(line);
        self.broadcast_locked(state, &envelope);
    }

    /// Game narration, delivered with the dedicated game-event sender so
    /// clients can route it away from chat.
    pub(crate) fn game_event_locked(&self, state: &mut RoomState, text: impl Into<String>) {
        let envelope = Envelope::from_client(ClientId::GAME_EVENT, PayloadKind::Message)
            .with_message(text);
        self.broadcast_locked(state, &envelope);
    }

    // -----------------------------------------------------------------
    // Broadcast with fail-fast eviction
    // -----------------------------------------------------------------

    /// Delivers an envelope to every member. Any member whose outbound
    /// channel is gone is evicted during the same pass; delivery to the
    /// remaining members is unaffected.
    pub(crate) fn broadcast_locked(&self, state: &mut RoomState, envelope: &Envelope) {
        let failed: Vec<ClientId> = state
            .members
            .iter()
            .filter(|(_, member)| !member.send(envelope.clone()))
            .map(|(id, _)| *id)
            .collect();
        for id in failed {
            self.evict_locked(state, id);
        }
    }

    /// Removes an unreachable member. Notifying the remaining members may
    /// reveal further unreachable members, so this recurses through
    /// `broadcast_locked`; the member set shrinks on every step.
    fn evict_locked(&self, state: &mut RoomState, id: ClientId) {
        let Some(client) = state.members.remove(&id) else {
            return;
        };
        warn!(room = %self.name, client_id = %id, "evicting unreachable client");
        client.clear_room();
        client.user().reset();
        let notice = Envelope::from_client(id, PayloadKind::Disconnect)
            .with_message(format!("{} disconnected", client.display_name()));
        self.broadcast_locked(state, &notice);
        self.on_client_removed_locked(state, id);
        self.maybe_close_locked(state);
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Closes the room once it is empty. The lobby never closes.
    fn maybe_close_locked(&self, state: &mut RoomState) {
        if state.running && state.members.is_empty() && !self.is_lobby() {
            self.close_locked(state);
        }
    }

    /// Marks the room closed, migrates any remaining members to the
    /// lobby, and deregisters from the registry.
    fn close_locked(&self, state: &mut RoomState) {
        state.running = false;
        if let Some(game) = state.game_mut() {
            game.cancel_timers();
        }
        let stragglers: Vec<Arc<RoomClient>> =
            std::mem::take(&mut state.members).into_values().collect();
        if let Some(registry) = self.registry.upgrade() {
            for client in stragglers {
                client.clear_room();
                client.user().reset();
                if let Err(error) = registry.lobby().add_client(&client) {
                    warn!(room = %self.name, client_id = %client.id(), %error,
                        "could not migrate client to the lobby");
                }
            }
            registry.remove_room(&self.name);
        }
        info!(room = %self.name, "room closed");
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room").field("name", &self.name).finish_non_exhaustive()
    }
}
