//! Signaling relay: forwards opaque payloads between two clients.
//!
//! The server never looks inside `data` and never checks that sender and
//! target share a room. It only checks that the target is still connected.

use duet_protocol::{ClientId, RelayKind, ServerMessage};

use crate::directory::Directory;

/// Forwards `data` from `from` to `to`, tagged with `kind`.
///
/// Returns `false` (after logging) if the target is gone.
pub(crate) async fn forward(
    directory: &Directory,
    from: ClientId,
    to: ClientId,
    kind: RelayKind,
    data: serde_json::Value,
) -> bool {
    let delivered = directory
        .send_to(to, ServerMessage::Relay { kind, from, data })
        .await;
    if delivered {
        tracing::trace!(%from, %to, %kind, "relayed");
    } else {
        tracing::debug!(%from, %to, %kind, "relay target gone, dropped");
    }
    delivered
}
