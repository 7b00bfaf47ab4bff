//! Connection registry: every live client and where it stands.
//!
//! The registry is the leaf of the core. It knows nothing about queues or
//! rooms; the [`Matchmaker`](crate::Matchmaker) decides each client's state
//! and records it here.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use duet_protocol::{ClientId, RoomId};

// ---------------------------------------------------------------------------
// ClientState
// ---------------------------------------------------------------------------

/// Membership state of one client.
///
/// ```text
///            ┌──────────────── Transitioning ◄───────────────┐
///            │                  │      │                     │
///            ▼                  ▼      ▼                     │
///          Idle ◄──────────── Waiting  InRoom ───────────────┘
///            ▲                           │
///            └──(partner left)───────────┘
/// ```
///
/// Every lifecycle operation passes through `Transitioning` and lands in
/// exactly one of `Idle`, `Waiting` or `InRoom`. The two shortcut edges
/// into `Idle` happen to a client that is not the one acting: its partner
/// dissolved the room, or it disconnected while queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Connected, not looking for a partner.
    Idle,
    /// In the availability queue.
    Waiting,
    /// A lifecycle operation is in flight for this client.
    Transitioning,
    /// Paired into the given room.
    InRoom(RoomId),
}

impl ClientState {
    /// Returns `true` if moving from `self` to `next` is a legal edge.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        use ClientState::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Transitioning, _) | (_, Transitioning) => true,
            (InRoom(_), Idle) | (Waiting, Idle) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Transitioning => write!(f, "Transitioning"),
            Self::InRoom(room_id) => write!(f, "InRoom({room_id})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ClientRecord {
    state: ClientState,
    connected_at: Instant,
}

/// Tracks every connected client and its [`ClientState`].
///
/// Unknown ids are never an error: disconnects race with in-flight events
/// all the time, so every operation on an absent id is a silent no-op.
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<ClientId, ClientRecord>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `client_id` in state `Idle`. Re-registering a live id keeps
    /// its current record.
    pub fn register(&mut self, client_id: ClientId) {
        self.clients.entry(client_id).or_insert_with(|| ClientRecord {
            state: ClientState::Idle,
            connected_at: Instant::now(),
        });
    }

    /// Removes `client_id`, returning how long it was connected.
    pub fn deregister(&mut self, client_id: ClientId) -> Option<Duration> {
        self.clients
            .remove(&client_id)
            .map(|record| record.connected_at.elapsed())
    }

    /// Returns the client's state, or `None` if it is not registered.
    pub fn state_of(&self, client_id: ClientId) -> Option<&ClientState> {
        self.clients.get(&client_id).map(|record| &record.state)
    }

    /// Records a new state for `client_id`. No-op for unknown clients.
    pub(crate) fn set_state(&mut self, client_id: ClientId, next: ClientState) {
        let Some(record) = self.clients.get_mut(&client_id) else {
            return;
        };
        debug_assert!(
            record.state.can_transition_to(&next),
            "illegal transition for {client_id}: {} -> {next}",
            record.state
        );
        if record.state != next {
            tracing::trace!(%client_id, from = %record.state, to = %next, "state change");
            record.state = next;
        }
    }

    /// Returns `true` if `client_id` is registered.
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.clients.contains_key(&client_id)
    }

    /// Iterates over every registered client and its state.
    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &ClientState)> {
        self.clients.iter().map(|(id, record)| (*id, &record.state))
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if no client is registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
