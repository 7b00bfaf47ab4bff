//! Wire protocol for Duet.
//!
//! This crate defines the "language" clients and the server speak:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`Envelope`], ids) —
//!   the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how they become bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong doing so.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope<M>) → Matchmaking core (ClientId, RoomId)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ClientId, ClientMessage, Envelope, RelayKind, RoomId, ServerMessage,
};
