//! Transition guard: per-client markers for in-flight lifecycle operations.

use std::collections::HashSet;

use duet_protocol::ClientId;

/// The set of clients currently undergoing a lifecycle mutation.
///
/// While a client's marker is held, no other lifecycle operation for it may
/// start, and the matchmaker will not pick it as anyone's partner.
#[derive(Debug, Default)]
pub struct TransitionGuard {
    held: HashSet<ClientId>,
}

impl TransitionGuard {
    /// Creates an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the marker for `client_id`. Returns `false` if it was
    /// already held, in which case the caller must not proceed.
    pub fn try_acquire(&mut self, client_id: ClientId) -> bool {
        self.held.insert(client_id)
    }

    /// Removes the marker for `client_id`.
    pub fn release(&mut self, client_id: ClientId) {
        self.held.remove(&client_id);
    }

    /// Returns `true` if `client_id` is mid-transition.
    pub fn is_held(&self, client_id: ClientId) -> bool {
        self.held.contains(&client_id)
    }

    /// Number of markers currently held.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Returns `true` if no marker is held.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}
