//! Rooms and the table that indexes them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use duet_protocol::{ClientId, RoomId};

/// One active two-party session.
#[derive(Debug, Clone)]
pub struct Room {
    id: RoomId,
    members: [ClientId; 2],
    formed_at: Instant,
}

impl Room {
    /// Pairs `initiator` with `candidate`. Returns `None` if they are the
    /// same client, since a room always has two distinct members.
    pub fn pair(initiator: ClientId, candidate: ClientId) -> Option<Self> {
        if initiator == candidate {
            return None;
        }
        Some(Self {
            id: RoomId::for_pair(initiator, candidate),
            members: [initiator, candidate],
            formed_at: Instant::now(),
        })
    }

    /// The room's id.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Both members, initiator first.
    pub fn members(&self) -> [ClientId; 2] {
        self.members
    }

    /// Returns `true` if `client_id` is one of the two members.
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.members.contains(&client_id)
    }

    /// Returns the other member, or `None` if `client_id` is not in the room.
    pub fn partner_of(&self, client_id: ClientId) -> Option<ClientId> {
        match self.members {
            [a, b] if a == client_id => Some(b),
            [a, b] if b == client_id => Some(a),
            _ => None,
        }
    }

    /// How long the room has existed.
    pub fn age(&self) -> Duration {
        self.formed_at.elapsed()
    }
}

/// All active rooms, plus a reverse index from member to room.
///
/// The index enforces "a client belongs to at most one room": `insert`
/// refuses a room whose members are already seated elsewhere.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<RoomId, Room>,
    member_rooms: HashMap<ClientId, RoomId>,
}

impl RoomTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `room`. Returns `false` (and records nothing) if either
    /// member already sits in a room or the id is taken.
    pub fn insert(&mut self, room: Room) -> bool {
        if self.rooms.contains_key(room.id())
            || room.members().iter().any(|m| self.member_rooms.contains_key(m))
        {
            return false;
        }
        for member in room.members() {
            self.member_rooms.insert(member, room.id().clone());
        }
        self.rooms.insert(room.id().clone(), room);
        true
    }

    /// Dissolves the room, returning it if it existed.
    pub fn remove(&mut self, room_id: &RoomId) -> Option<Room> {
        let room = self.rooms.remove(room_id)?;
        for member in room.members() {
            self.member_rooms.remove(&member);
        }
        Some(room)
    }

    /// Looks up a room by id.
    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Returns the room `client_id` is currently in, if any.
    pub fn room_of(&self, client_id: ClientId) -> Option<&Room> {
        self.member_rooms
            .get(&client_id)
            .and_then(|room_id| self.rooms.get(room_id))
    }

    /// Iterates over all active rooms.
    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Number of active rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns `true` if there are no rooms.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
