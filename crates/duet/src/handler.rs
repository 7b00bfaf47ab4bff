//! Per-connection handler: welcome, message routing, outbound delivery.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register the client with the matchmaker and the directory
//!   2. Send `welcome` carrying the client's id
//!   3. Loop: decode inbound envelopes and dispatch them, while draining
//!      the client's outbound channel onto the socket
//!   4. On exit, the guard runs the disconnect path

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use duet_protocol::{ClientId, ClientMessage, Codec, Envelope, ServerMessage};
use duet_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time;

use crate::server::ServerState;
use crate::{DuetError, relay};

/// Drop guard that runs the disconnect path when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async locks.
struct ClientGuard {
    client_id: ClientId,
    state: Arc<ServerState>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let client_id = self.client_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.directory.remove(client_id).await;
            let notifications = state.matchmaker.write().await.disconnect(client_id);
            state.directory.deliver(notifications).await;
        });
    }
}

/// Whether the message loop should keep going after a dispatch.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Sequences and timestamps everything this connection sends.
struct Outbox {
    seq: u64,
    opened: Instant,
}

impl Outbox {
    fn new() -> Self {
        Self {
            seq: 1,
            opened: Instant::now(),
        }
    }

    async fn send(
        &mut self,
        conn: &WebSocketConnection,
        codec: &impl Codec,
        message: ServerMessage,
    ) -> Result<(), DuetError> {
        let envelope = Envelope::new(self.seq, self.opened.elapsed().as_millis() as u64, message);
        self.seq += 1;
        let bytes = codec.encode(&envelope)?;
        conn.send(&bytes).await?;
        Ok(())
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), DuetError> {
    let client_id = ClientId(conn.id().into_inner());
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.directory.insert(client_id, tx).await;
    state.matchmaker.write().await.connect(client_id);
    let _guard = ClientGuard {
        client_id,
        state: Arc::clone(&state),
    };
    let online = state.directory.len().await;
    tracing::info!(%client_id, online, "client connected");

    let mut outbox = Outbox::new();
    outbox
        .send(
            &conn,
            &state.codec,
            ServerMessage::Welcome {
                client_id,
                server_time: unix_millis(),
            },
        )
        .await?;

    let idle = time::sleep(state.idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = &mut idle => {
                tracing::info!(%client_id, "connection idle too long, dropping");
                break;
            }

            inbound = conn.recv() => {
                let data = match inbound {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%client_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%client_id, error = %e, "recv error");
                        break;
                    }
                };
                idle.as_mut().reset(time::Instant::now() + state.idle_timeout);

                let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::debug!(%client_id, error = %e, "failed to decode envelope");
                        let reply = ServerMessage::Error {
                            code: 400,
                            message: format!("invalid message: {e}"),
                        };
                        outbox.send(&conn, &state.codec, reply).await?;
                        continue;
                    }
                };

                let flow = dispatch(&conn, &state, client_id, envelope.message, &mut outbox).await?;
                if flow == Flow::Close {
                    if let Err(e) = conn.close().await {
                        tracing::debug!(%client_id, error = %e, "close failed");
                    }
                    break;
                }
            }

            Some(message) = rx.recv() => {
                outbox.send(&conn, &state.codec, message).await?;
            }
        }
    }

    // _guard drops here → disconnect fires.
    Ok(())
}

/// Routes one decoded client message.
async fn dispatch(
    conn: &WebSocketConnection,
    state: &ServerState,
    client_id: ClientId,
    message: ClientMessage,
    outbox: &mut Outbox,
) -> Result<Flow, DuetError> {
    match message {
        ClientMessage::Start => {
            let notifications = state.matchmaker.write().await.request_match(client_id);
            state.directory.deliver(notifications).await;
        }

        ClientMessage::Next {
            room_id,
            partner_id,
        } => {
            let notifications = state
                .matchmaker
                .write()
                .await
                .skip(client_id, room_id, partner_id);
            state.directory.deliver(notifications).await;
        }

        ClientMessage::Stop {
            room_id,
            partner_id,
        } => {
            let notifications = state
                .matchmaker
                .write()
                .await
                .stop(client_id, room_id, partner_id);
            state.directory.deliver(notifications).await;
        }

        ClientMessage::Relay { kind, to, data } => {
            relay::forward(&state.directory, client_id, to, kind, data).await;
        }

        ClientMessage::Heartbeat { client_time } => {
            let ack = ServerMessage::HeartbeatAck {
                client_time,
                server_time: unix_millis(),
            };
            outbox.send(conn, &state.codec, ack).await?;
        }

        ClientMessage::Disconnect { reason } => {
            tracing::info!(%client_id, %reason, "client disconnected");
            return Ok(Flow::Close);
        }
    }

    Ok(Flow::Continue)
}

/// Wall-clock milliseconds since the Unix epoch, for client clock sync.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use super::*;

    #[test]
    fn test_connection_future_can_be_spawned() {
        // Compiles only if the handler future is `Send`; nothing is run.
        fn spawnable(
            conn: WebSocketConnection,
            state: Arc<ServerState>,
        ) -> impl Future<Output = Result<(), DuetError>> + Send {
            handle_connection(conn, state)
        }
        let _ = spawnable;
    }

    #[test]
    fn test_unix_millis_is_wall_clock() {
        // 2020-01-01T00:00:00Z
        assert!(unix_millis() > 1_577_836_800_000);
    }
}
