//! Who can be reached, and how.
//!
//! Each connection task registers an unbounded sender here on connect and
//! removes it on disconnect. Everything that wants to talk to a client
//! (matchmaking notifications, relays, presence broadcasts) goes through
//! the directory, and the client's own task writes to the socket.

use std::collections::HashMap;

use duet_match::Notification;
use duet_protocol::{ClientId, ServerMessage};
use tokio::sync::{RwLock, mpsc};

/// Outbound queue feeding one connection task.
pub(crate) type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Live client → outbound channel map.
#[derive(Default)]
pub(crate) struct Directory {
    senders: RwLock<HashMap<ClientId, Outbound>>,
}

impl Directory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, client_id: ClientId, tx: Outbound) {
        self.senders.write().await.insert(client_id, tx);
    }

    pub(crate) async fn remove(&self, client_id: ClientId) {
        self.senders.write().await.remove(&client_id);
    }

    /// Queues `message` for `client_id`. Returns `false` if the client is
    /// gone (never registered, or its task already exited).
    pub(crate) async fn send_to(&self, client_id: ClientId, message: ServerMessage) -> bool {
        match self.senders.read().await.get(&client_id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Delivers matchmaking notifications. Recipients that left in the
    /// meantime are skipped.
    pub(crate) async fn deliver(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let senders = self.senders.read().await;
        for Notification { to, message } in notifications {
            let delivered = senders.get(&to).is_some_and(|tx| tx.send(message).is_ok());
            if !delivered {
                tracing::debug!(client_id = %to, "notification for departed client dropped");
            }
        }
    }

    /// Sends `message` to every live client. Returns how many it reached.
    pub(crate) async fn broadcast(&self, message: ServerMessage) -> usize {
        let senders = self.senders.read().await;
        senders
            .values()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count()
    }

    pub(crate) async fn len(&self) -> usize {
        self.senders.read().await.len()
    }
}
