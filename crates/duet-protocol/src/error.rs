//! Error types for the protocol layer.
//!
//! Each crate in Duet defines its own error enum, so a `ProtocolError`
//! always means serialization went wrong, never networking or matchmaking.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `type` tag, or a missing
    /// required field.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}
