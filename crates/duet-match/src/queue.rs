//! The availability queue: clients waiting for a partner, oldest first.

use std::collections::{HashSet, VecDeque};

use duet_protocol::ClientId;

use crate::TransitionGuard;

/// Insertion-ordered set of waiting clients.
///
/// The `VecDeque` keeps arrival order for fairness; the `HashSet` makes
/// `contains` and the idempotence checks O(1). The two are kept in sync.
#[derive(Debug, Default)]
pub struct AvailabilityQueue {
    order: VecDeque<ClientId>,
    members: HashSet<ClientId>,
}

impl AvailabilityQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `client_id` unless it is already queued.
    ///
    /// Returns `true` if the client was added.
    pub fn enqueue(&mut self, client_id: ClientId) -> bool {
        if !self.members.insert(client_id) {
            return false;
        }
        self.order.push_back(client_id);
        true
    }

    /// Removes and returns the longest-waiting client that is neither in
    /// `excluding` nor holding a transition marker.
    pub fn dequeue_next(
        &mut self,
        excluding: &[ClientId],
        guard: &TransitionGuard,
    ) -> Option<ClientId> {
        let pos = self
            .order
            .iter()
            .position(|id| !excluding.contains(id) && !guard.is_held(*id))?;
        let client_id = self.order.remove(pos)?;
        self.members.remove(&client_id);
        Some(client_id)
    }

    /// Removes `client_id` if queued. Returns `true` if it was.
    pub fn remove(&mut self, client_id: ClientId) -> bool {
        if !self.members.remove(&client_id) {
            return false;
        }
        self.order.retain(|id| *id != client_id);
        true
    }

    /// Returns `true` if `client_id` is waiting.
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.members.contains(&client_id)
    }

    /// Waiting clients in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.order.iter().copied()
    }

    /// Number of waiting clients.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
