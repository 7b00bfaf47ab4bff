/// Failures at the socket level.
///
/// None of these are fatal to the server: accept errors are logged by the
/// accept loop and per-connection errors end only that connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not bind listener: {0}")]
    BindFailed(#[source] std::io::Error),

    /// TCP accept or the WebSocket handshake failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The upgrade request's `Origin` is not on the allow-list. The peer
    /// has already been answered with 403.
    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    /// The peer at this address opened a socket but did not finish the
    /// upgrade in time.
    #[error("handshake timed out for {0}")]
    HandshakeTimedOut(std::net::SocketAddr),

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}
