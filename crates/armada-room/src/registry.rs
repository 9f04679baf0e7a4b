//! The process-wide room registry: name lookup, client id allocation,
//! and the lobby.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use armada_protocol::ClientId;
use tracing::{debug, info};

use crate::client::RoomClient;
use crate::game::GameState;
use crate::room::{Room, RoomKind};
use crate::RoomError;

/// The distinguished room every client lands in. Never closes.
pub const LOBBY_ROOM: &str = "lobby";

/// Most entries a room listing returns.
pub const MAX_ROOM_RESULTS: usize = 10;

/// Owns the name-to-room mapping and allocates client ids.
///
/// Constructed explicitly and shared as an `Arc`, so tests can run any
/// number of isolated registries side by side.
pub struct Registry {
    self_weak: Weak<Registry>,
    lobby: Arc<Room>,
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    next_client_id: AtomicI64,
}

impl Registry {
    /// Creates a registry with a fresh lobby.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_weak: &Weak<Registry>| {
            let lobby = Room::new(LOBBY_ROOM, RoomKind::Plain, self_weak.clone());
            let rooms = HashMap::from([(LOBBY_ROOM.to_string(), lobby.clone())]);
            Self {
                self_weak: self_weak.clone(),
                lobby,
                rooms: RwLock::new(rooms),
                next_client_id: AtomicI64::new(1),
            }
        })
    }

    /// Allocates the next client id. Ids start at 1, strictly increase,
    /// and are never reused within a process lifetime.
    pub fn next_client_id(&self) -> ClientId {
        ClientId(self.next_client_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn lobby(&self) -> Arc<Room> {
        self.lobby.clone()
    }

    pub fn room(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&room_key(name))
            .cloned()
    }

    pub fn room_count(&self) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Creates a game room. Room names are case-insensitive and must be
    /// unique; the lobby name is reserved.
    pub fn create_room(&self, name: &str) -> Result<Arc<Room>, RoomError> {
        let trimmed = name.trim();
        let key = room_key(trimmed);
        if key.is_empty() {
            return Err(RoomError::RoomNotFound(name.to_string()));
        }
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        if rooms.contains_key(&key) {
            return Err(RoomError::DuplicateRoom(trimmed.to_string()));
        }
        let room = Room::new(
            trimmed,
            RoomKind::Game(GameState::new()),
            self.self_weak.clone(),
        );
        rooms.insert(key, room.clone());
        info!(room = %trimmed, "room created");
        Ok(room)
    }

    /// Moves a client into the named room, leaving its current room
    /// first. A client is never a member of two rooms at once; if the
    /// target refuses the join (closed in the meantime), the client is
    /// parked in the lobby instead of being left roomless.
    pub fn join_room(
        &self,
        name: &str,
        client: &Arc<RoomClient>,
    ) -> Result<Arc<Room>, RoomError> {
        let target = self
            .room(name)
            .ok_or_else(|| RoomError::RoomNotFound(name.trim().to_string()))?;
        if let Some(current) = client.room() {
            if Arc::ptr_eq(&current, &target) {
                return Err(RoomError::AlreadyInRoom(target.name().to_string()));
            }
            current.remove_client(client);
        }
        match target.add_client(client) {
            Ok(()) => Ok(target),
            Err(error) => {
                let _ = self.lobby.add_client(client);
                Err(error)
            }
        }
    }

    /// Room names matching `query` case-insensitively, sorted, capped at
    /// [`MAX_ROOM_RESULTS`].
    pub fn list_rooms(&self, query: &str) -> Vec<String> {
        let needle = query.trim().to_lowercase();
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = rooms
            .values()
            .filter(|room| room.name().to_lowercase().contains(&needle))
            .map(|room| room.name().to_string())
            .collect();
        names.sort();
        names.truncate(MAX_ROOM_RESULTS);
        names
    }

    /// Deregisters a room. The lobby cannot be removed. Called by rooms
    /// when they close themselves.
    pub(crate) fn remove_room(&self, name: &str) {
        let key = room_key(name);
        if key == LOBBY_ROOM {
            return;
        }
        let removed = self
            .rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .is_some();
        if removed {
            debug!(room = %name, "room deregistered");
        }
    }

    /// Disconnects every member of every room, best effort.
    pub fn shutdown(&self) {
        let rooms: Vec<Arc<Room>> = {
            let mut map = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
            map.drain().map(|(_, room)| room).collect()
        };
        for room in rooms {
            room.disconnect_all();
        }
        info!("registry shut down");
    }
}

fn room_key(name: &str) -> String {
    name.trim().to_lowercase()
}
