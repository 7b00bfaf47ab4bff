//! # Duet
//!
//! Anonymous one-to-one chat matchmaking and signaling server.
//!
//! Duet pairs connected browsers into two-person rooms, relays the
//! connection-negotiation and chat messages between the two members, and
//! tears rooms down cleanly when someone skips, stops or vanishes. The
//! peer-to-peer media itself never touches the server.
//!
//! ## Layers
//!
//! ```text
//! duet-transport  WebSocket accept loop, origin allow-list
//! duet-protocol   ClientMessage / ServerMessage / Envelope, JSON codec
//! duet-match      Matchmaker: registry, queue, rooms, transition markers
//! duet-presence   participant-count formula and ticker
//! duet            this crate: server loop, per-connection handler, relay
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duet::prelude::*;
//!
//! # async fn start() -> Result<(), DuetError> {
//! let server = DuetServerBuilder::new().bind("0.0.0.0:8080").build().await?;
//! server.run().await
//! # }
//! ```

mod config;
mod directory;
mod error;
mod handler;
mod relay;
mod server;

pub use config::ServerConfig;
pub use error::DuetError;
pub use server::{DuetServer, DuetServerBuilder};

/// Everything needed to configure, run and talk to a Duet server.
pub mod prelude {
    pub use crate::{DuetError, DuetServer, DuetServerBuilder, ServerConfig};
    pub use duet_match::{ClientState, Matchmaker, Notification, Occupancy};
    pub use duet_presence::{PresenceConfig, PresenceFormula};
    pub use duet_protocol::{
        ClientId, ClientMessage, Codec, Envelope, JsonCodec, ProtocolError, RelayKind, RoomId,
        ServerMessage,
    };
    pub use duet_transport::{TransportConfig, TransportError};
}
