//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::{Connection, ConnectionId, Transport, TransportConfig, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: Arc<TransportConfig>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport that accepts any origin.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with(addr, TransportConfig::default()).await
    }

    /// Binds a new WebSocket transport with the given settings.
    pub async fn bind_with(
        addr: &str,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(
            addr,
            allowed_origins = config.allowed_origins.len(),
            handshake_timeout_ms = config.handshake_timeout.as_millis() as u64,
            "WebSocket transport listening"
        );
        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    /// Accepts the next TCP connection without upgrading it.
    ///
    /// Returns as soon as the socket is open, so an accept loop can hand
    /// the handshake to its own task and go straight back to accepting.
    pub async fn accept_pending(&mut self) -> Result<PendingUpgrade, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(PendingUpgrade {
            stream,
            addr,
            config: Arc::clone(&self.config),
        })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        self.accept_pending().await?.upgrade().await
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// An accepted TCP socket that has not finished the WebSocket upgrade.
pub struct PendingUpgrade {
    stream: TcpStream,
    addr: SocketAddr,
    config: Arc<TransportConfig>,
}

impl PendingUpgrade {
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the upgrade handshake, checking the origin allow-list.
    ///
    /// Gives up with [`TransportError::HandshakeTimedOut`] if the peer has
    /// not completed it within the configured handshake timeout.
    pub async fn upgrade(self) -> Result<WebSocketConnection, TransportError> {
        let Self {
            stream,
            addr,
            config,
        } = self;

        // The callback cannot return our error type, so remember the
        // rejected origin and report it once the upgrade has failed.
        let mut rejected: Option<String> = None;
        let callback = |req: &Request, resp: Response| {
            let origin = req
                .headers()
                .get("origin")
                .and_then(|v| v.to_str().ok());
            if config.allows(origin) {
                Ok(resp)
            } else {
                rejected = Some(origin.unwrap_or("<none>").to_string());
                let mut err =
                    ErrorResponse::new(Some("origin not allowed".into()));
                *err.status_mut() = StatusCode::FORBIDDEN;
                Err(err)
            }
        };

        let upgrade = time::timeout(
            config.handshake_timeout,
            tokio_tungstenite::accept_hdr_async(stream, callback),
        )
        .await;
        let ws = match upgrade {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                if let Some(origin) = rejected {
                    tracing::debug!(%addr, %origin, "rejected upgrade from origin");
                    return Err(TransportError::OriginRejected(origin));
                }
                return Err(TransportError::AcceptFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                )));
            }
            Err(_) => {
                tracing::debug!(%addr, "upgrade handshake timed out");
                return Err(TransportError::HandshakeTimedOut(addr));
            }
        };

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single WebSocket connection.
///
/// The socket is split so a pending `recv` never holds up a `send`.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // JSON frames go out as text so browser clients can read them directly.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
