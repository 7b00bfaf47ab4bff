//! `DuetServer` builder and server loop.
//!
//! This is the entry point for running a Duet server. It ties together all
//! the layers: transport → protocol → matchmaking core, plus the presence
//! broadcaster running beside them.

use std::sync::Arc;
use std::time::Duration;

use duet_match::Matchmaker;
use duet_presence::{PresenceConfig, PresenceTicker};
use duet_protocol::{JsonCodec, ServerMessage};
use duet_transport::{PendingUpgrade, Transport, TransportError, WebSocketTransport};
use tokio::sync::RwLock;

use crate::directory::Directory;
use crate::handler::handle_connection;
use crate::{DuetError, ServerConfig};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks.
pub(crate) struct ServerState {
    /// The whole matchmaking core. Lifecycle events take the write lock
    /// for their full duration; presence only ever reads.
    pub(crate) matchmaker: RwLock<Matchmaker>,
    pub(crate) directory: Directory,
    pub(crate) codec: JsonCodec,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Duet server.
///
/// # Example
///
/// ```rust,no_run
/// use duet::prelude::*;
///
/// # async fn start() -> Result<(), DuetError> {
/// let server = DuetServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .allowed_origins(vec!["https://duet.example".into()])
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DuetServerBuilder {
    config: ServerConfig,
}

impl DuetServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Starts from a complete config.
    pub fn with_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets how long a silent connection is kept before it is dropped.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Restricts which browser origins may connect. Empty allows all.
    pub fn allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.config.transport.allowed_origins = origins;
        self
    }

    /// Sets how long a new socket may take to finish the WebSocket upgrade.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.handshake_timeout = timeout;
        self
    }

    /// Sets the presence broadcast configuration.
    pub fn presence(mut self, presence: PresenceConfig) -> Self {
        self.config.presence = presence;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<DuetServer, DuetError> {
        let ServerConfig {
            bind_addr,
            idle_timeout,
            transport,
            presence,
        } = self.config;

        let transport = WebSocketTransport::bind_with(&bind_addr, transport).await?;

        let state = Arc::new(ServerState {
            matchmaker: RwLock::new(Matchmaker::new()),
            directory: Directory::new(),
            codec: JsonCodec,
            idle_timeout,
        });

        Ok(DuetServer {
            transport,
            state,
            presence,
        })
    }
}

impl Default for DuetServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Duet server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DuetServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
    presence: PresenceConfig,
}

impl DuetServer {
    /// Creates a new builder.
    pub fn builder() -> DuetServerBuilder {
        DuetServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the presence broadcaster and the accept loop.
    ///
    /// Spawns a handler task for each accepted connection. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), DuetError> {
        tracing::info!(
            presence_interval_ms = self.presence.interval.as_millis() as u64,
            formula = %self.presence.formula,
            "Duet server running"
        );

        tokio::spawn(run_presence(Arc::clone(&self.state), self.presence.clone()));

        loop {
            match self.transport.accept_pending().await {
                Ok(pending) => {
                    tokio::spawn(serve(pending, Arc::clone(&self.state)));
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Finishes the upgrade and runs the connection handler.
///
/// Runs on the connection's own task so a peer that stalls mid-handshake
/// never holds up the accept loop.
async fn serve(pending: PendingUpgrade, state: Arc<ServerState>) {
    let peer = pending.peer_addr();
    let conn = match pending.upgrade().await {
        Ok(conn) => conn,
        Err(TransportError::OriginRejected(origin)) => {
            tracing::warn!(%peer, %origin, "connection from disallowed origin refused");
            return;
        }
        Err(e) => {
            tracing::debug!(%peer, error = %e, "upgrade failed");
            return;
        }
    };
    if let Err(e) = handle_connection(conn, state).await {
        tracing::debug!(%peer, error = %e, "connection ended with error");
    }
}

/// Periodically tells every client how many participants are around.
async fn run_presence(state: Arc<ServerState>, config: PresenceConfig) {
    let formula = config.formula;
    let mut ticker = PresenceTicker::new(config);

    loop {
        let tick = ticker.wait_for_tick().await;
        let occupancy = state.matchmaker.read().await.occupancy();
        let count = formula.count(occupancy);
        let reached = state
            .directory
            .broadcast(ServerMessage::ActiveParticipantCount { count })
            .await;
        tracing::debug!(tick = tick.tick, count, reached, "presence broadcast");
    }
}
