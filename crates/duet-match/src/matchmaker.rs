//! The matchmaker: the single state container for the whole core.
//!
//! It owns the registry, the availability queue, the room table and the
//! transition guard, and every mutation goes through its methods. Like the
//! registries it is built from, it is NOT thread-safe by itself: the server
//! keeps exactly one behind an `RwLock` and takes the write lock for each
//! lifecycle operation. That lock is the global critical section; the
//! transition markers inside make the per-client state machine explicit
//! and reject re-entrant operations.
//!
//! # Notifications
//!
//! Operations never perform I/O. Each returns the messages it wants
//! delivered as a `Vec<Notification>`, and the caller sends them after
//! releasing the lock.

use duet_protocol::{ClientId, RoomId, ServerMessage};

use crate::{AvailabilityQueue, ClientState, Registry, Room, RoomTable, TransitionGuard};

/// Sent to a client that has been queued.
pub const WAITING_MESSAGE: &str = "Waiting for another user...";

/// A message the core wants delivered to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Recipient.
    pub to: ClientId,
    /// What to send.
    pub message: ServerMessage,
}

impl Notification {
    pub(crate) fn new(to: ClientId, message: ServerMessage) -> Self {
        Self { to, message }
    }
}

/// Counts used by the presence broadcaster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Occupancy {
    /// Clients in the availability queue.
    pub waiting: usize,
    /// Active rooms.
    pub rooms: usize,
    /// Registered clients, whatever their state.
    pub connected: usize,
}

/// Pairs waiting clients into rooms and tears rooms down.
///
/// ## Lifecycle
///
/// ```text
/// connect() ──→ request_match() ──→ [Waiting] ──(someone starts)──→ [InRoom]
///                     │                                               │
///                     └──────────(someone waiting)───────────────────→┤
///                                                                     │
///                   skip() ←──────────────────────────────────────────┤
///                   stop() ──→ [Idle] ←───────────────────────────────┤
///             disconnect() ──→ (gone; partner requeued)   ←───────────┘
/// ```
#[derive(Debug, Default)]
pub struct Matchmaker {
    pub(crate) registry: Registry,
    pub(crate) queue: AvailabilityQueue,
    pub(crate) rooms: RoomTable,
    pub(crate) guard: TransitionGuard,
}

impl Matchmaker {
    /// Creates an empty matchmaker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly connected client in state `Idle`.
    pub fn connect(&mut self, client_id: ClientId) {
        self.registry.register(client_id);
        tracing::info!(%client_id, connected = self.registry.len(), "client registered");
    }

    // -----------------------------------------------------------------------
    // Matching
    // -----------------------------------------------------------------------

    /// Pairs `client_id` with the longest-waiting client, or queues it.
    ///
    /// No-op if the client is unknown, mid-transition, or already in a room.
    pub fn request_match(&mut self, client_id: ClientId) -> Vec<Notification> {
        let mut out = Vec::new();
        if !self.registry.contains(client_id) {
            tracing::debug!(%client_id, "start from unknown client ignored");
            return out;
        }
        if self.rooms.room_of(client_id).is_some() {
            tracing::debug!(%client_id, "start while in a room ignored");
            return out;
        }
        let started = self.with_marker(client_id, |mm| mm.match_marked(client_id, &mut out));
        if started.is_none() {
            tracing::debug!(%client_id, "start dropped, client already transitioning");
        }
        out
    }

    /// The matching step. The caller must hold `client_id`'s marker and
    /// the client must not be in a room.
    pub(crate) fn match_marked(&mut self, client_id: ClientId, out: &mut Vec<Notification>) {
        self.queue.remove(client_id);

        let Some(candidate) = self.queue.dequeue_next(&[client_id], &self.guard) else {
            self.queue.enqueue(client_id);
            tracing::info!(%client_id, waiting = self.queue.len(), "client queued");
            out.push(Notification::new(
                client_id,
                ServerMessage::Waiting {
                    message: WAITING_MESSAGE.to_owned(),
                },
            ));
            return;
        };

        // dequeue_next never returns a marked client.
        let marked = self.guard.try_acquire(candidate);
        debug_assert!(marked, "{candidate} picked while transitioning");
        self.registry.set_state(candidate, ClientState::Transitioning);

        let formed = Room::pair(client_id, candidate).and_then(|room| {
            let room_id = room.id().clone();
            self.rooms.insert(room).then_some(room_id)
        });
        match formed {
            Some(room_id) => {
                tracing::info!(
                    %room_id,
                    initiator = %client_id,
                    %candidate,
                    rooms = self.rooms.len(),
                    "room formed"
                );
                for (to, partner_id) in [(client_id, candidate), (candidate, client_id)] {
                    out.push(Notification::new(
                        to,
                        ServerMessage::JoinRoom {
                            room_id: room_id.clone(),
                            partner_id,
                            self_id: to,
                        },
                    ));
                }
            }
            None => {
                // Only reachable if a member was already seated; put both
                // back in line rather than lose them.
                tracing::warn!(%client_id, %candidate, "room could not be recorded");
                self.queue.enqueue(candidate);
                self.queue.enqueue(client_id);
            }
        }

        self.guard.release(candidate);
        self.settle(candidate);
    }

    // -----------------------------------------------------------------------
    // Markers and state bookkeeping
    // -----------------------------------------------------------------------

    /// Runs `f` while holding `client_id`'s transition marker.
    ///
    /// Returns `None` without running `f` if the marker is already held.
    /// The marker is released and the client's state settled on return.
    pub(crate) fn with_marker<R>(
        &mut self,
        client_id: ClientId,
        f: impl FnOnce(&mut Self) -> R,
    ) -> Option<R> {
        if !self.guard.try_acquire(client_id) {
            return None;
        }
        self.registry.set_state(client_id, ClientState::Transitioning);
        let result = f(self);
        self.guard.release(client_id);
        self.settle(client_id);
        Some(result)
    }

    /// Recomputes `client_id`'s recorded state from the queue, the room
    /// table and the guard.
    pub(crate) fn settle(&mut self, client_id: ClientId) {
        let state = self.derived_state(client_id);
        self.registry.set_state(client_id, state);
    }

    fn derived_state(&self, client_id: ClientId) -> ClientState {
        if self.guard.is_held(client_id) {
            ClientState::Transitioning
        } else if let Some(room) = self.rooms.room_of(client_id) {
            ClientState::InRoom(room.id().clone())
        } else if self.queue.contains(client_id) {
            ClientState::Waiting
        } else {
            ClientState::Idle
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The client's state, or `None` if it is not connected.
    pub fn state_of(&self, client_id: ClientId) -> Option<&ClientState> {
        self.registry.state_of(client_id)
    }

    /// The room `client_id` is in, if any.
    pub fn room_of(&self, client_id: ClientId) -> Option<&Room> {
        self.rooms.room_of(client_id)
    }

    /// Looks up a room by id.
    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Waiting clients, oldest first.
    pub fn waiting(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.queue.iter()
    }

    pub fn waiting_count(&self) -> usize {
        self.queue.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Snapshot of the counts the presence broadcaster reports on.
    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            waiting: self.queue.len(),
            rooms: self.rooms.len(),
            connected: self.registry.len(),
        }
    }

    /// Checks every structural invariant and describes the ones that fail.
    ///
    /// Meant to be called between operations, when no marker is held. An
    /// empty result means the core is consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if !self.guard.is_empty() {
            violations.push(format!("{} transition markers left held", self.guard.len()));
        }

        for client_id in self.queue.iter() {
            if !self.registry.contains(client_id) {
                violations.push(format!("{client_id} queued but not registered"));
            }
            if self.rooms.room_of(client_id).is_some() {
                violations.push(format!("{client_id} both queued and in a room"));
            }
        }

        for room in self.rooms.iter() {
            let [a, b] = room.members();
            if a == b {
                violations.push(format!("room {} has a single member twice", room.id()));
            }
            for member in room.members() {
                let expected = ClientState::InRoom(room.id().clone());
                if self.registry.state_of(member) != Some(&expected) {
                    violations.push(format!(
                        "{member} in room {} but recorded as {:?}",
                        room.id(),
                        self.registry.state_of(member)
                    ));
                }
                if self.rooms.room_of(member).map(Room::id) != Some(room.id()) {
                    violations.push(format!("{member} missing from member index"));
                }
            }
        }

        for (client_id, state) in self.registry.iter() {
            let derived = self.derived_state(client_id);
            if *state != derived {
                violations.push(format!(
                    "{client_id} recorded as {state} but is actually {derived}"
                ));
            }
        }

        violations
    }
}
