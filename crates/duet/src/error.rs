//! Unified error type for the Duet server.

use duet_protocol::ProtocolError;
use duet_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The matchmaking core never fails (stale or racing requests are no-ops),
/// so only the outer layers contribute variants. `#[from]` lets `?`
/// convert them automatically.
#[derive(Debug, thiserror::Error)]
pub enum DuetError {
    /// A socket-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
