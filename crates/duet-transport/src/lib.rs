//! Transport abstraction layer for Duet.
//!
//! The server loop is written against [`Transport`] (accepting peers) and
//! [`Connection`] (moving frames to and from one peer). The only backend
//! is a WebSocket listener, which also enforces the browser origin
//! allow-list during the upgrade.
//!
//! # Feature Flags
//!
//! - `websocket` (default): `WebSocketTransport` on `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingUpgrade, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Process-unique number assigned to each accepted socket.
///
/// The server reuses it as the client's public id, so it is never recycled
/// while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Settings applied while accepting connections.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Origins allowed to open a connection, compared exactly against the
    /// `Origin` header of the upgrade request.
    ///
    /// Empty means every origin (and requests without one) is accepted.
    pub allowed_origins: Vec<String>,

    /// How long a freshly accepted socket has to finish the WebSocket
    /// upgrade before it is dropped. Default: 10 s.
    pub handshake_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Default settings restricted to `origins`.
    pub fn with_origins(origins: Vec<String>) -> Self {
        Self {
            allowed_origins: origins,
            ..Self::default()
        }
    }

    /// Returns `true` if a request carrying `origin` may connect.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allowed_origins.iter().any(|o| o == origin),
            None => false,
        }
    }
}

/// A listener handing out one [`Connection`] per peer.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Resolves once the next peer has finished its handshake.
    ///
    /// The handshake runs inline, so a slow peer holds up this call until
    /// its handshake timeout. A failed handshake is returned as an error;
    /// the listener itself stays usable.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// The bound address, useful when binding to port 0.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// One peer's frame stream.
///
/// `send` and `recv` may be awaited concurrently from different tasks.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Writes one frame.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads the next data frame, skipping control frames.
    ///
    /// `Ok(None)` means the peer closed the socket.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Starts the closing handshake.
    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}
