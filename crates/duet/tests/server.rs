//! Integration tests for the Duet server, handler, and full connection flow.
//!
//! Every test starts a real server on an OS-assigned port and drives it
//! with `tokio-tungstenite` clients speaking the JSON wire format.

use std::time::Duration;

use duet::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Starts a server on a random port and returns the address.
async fn start_server_with(builder: DuetServerBuilder) -> String {
    let server = builder
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn start_server() -> String {
    start_server_with(DuetServerBuilder::new()).await
}

/// Connects and consumes the welcome message. Returns the assigned id.
async fn connect(addr: &str) -> (ClientWs, ClientId) {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    match recv(&mut ws).await {
        ServerMessage::Welcome { client_id, .. } => (ws, client_id),
        other => panic!("expected welcome, got {other:?}"),
    }
}

async fn send(ws: &mut ClientWs, message: ClientMessage) {
    let text = serde_json::to_string(&Envelope::new(0, 0, message)).expect("encode");
    ws.send(Message::Text(text.into())).await.expect("send");
}

async fn recv_envelope(ws: &mut ClientWs) -> Envelope<ServerMessage> {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        if frame.is_text() || frame.is_binary() {
            return serde_json::from_slice(&frame.into_data()).expect("decode");
        }
    }
}

async fn recv(ws: &mut ClientWs) -> ServerMessage {
    recv_envelope(ws).await.message
}

/// Reads a `join-room` and returns (room id, partner id).
async fn expect_join(ws: &mut ClientWs, self_id: ClientId) -> (RoomId, ClientId) {
    match recv(ws).await {
        ServerMessage::JoinRoom {
            room_id,
            partner_id,
            self_id: got_self,
        } => {
            assert_eq!(got_self, self_id);
            (room_id, partner_id)
        }
        other => panic!("expected join-room, got {other:?}"),
    }
}

async fn expect_waiting(ws: &mut ClientWs) {
    let msg = recv(ws).await;
    assert!(matches!(msg, ServerMessage::Waiting { .. }), "got {msg:?}");
}

/// Asserts the server closes (or drops) the connection soon.
async fn expect_closed(ws: &mut ClientWs) {
    let deadline = Duration::from_secs(3);
    let result = tokio::time::timeout(deadline, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) => return,
                Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(result.is_ok(), "connection was not closed");
}

/// Connects two clients and pairs them. Returns both sockets, ids and the room.
async fn paired(addr: &str) -> (ClientWs, ClientId, ClientWs, ClientId, RoomId) {
    let (mut a, a_id) = connect(addr).await;
    let (mut b, b_id) = connect(addr).await;
    send(&mut a, ClientMessage::Start).await;
    expect_waiting(&mut a).await;
    send(&mut b, ClientMessage::Start).await;
    let (room_id, partner) = expect_join(&mut a, a_id).await;
    assert_eq!(partner, b_id);
    let (b_room, partner) = expect_join(&mut b, b_id).await;
    assert_eq!(partner, a_id);
    assert_eq!(room_id, b_room);
    (a, a_id, b, b_id, room_id)
}

// =========================================================================
// Connection basics
// =========================================================================

#[tokio::test]
async fn test_welcome_is_first_message() {
    let addr = start_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("connect");

    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.seq, 1);
    assert!(matches!(envelope.message, ServerMessage::Welcome { .. }));
}

#[tokio::test]
async fn test_each_connection_gets_a_distinct_id() {
    let addr = start_server().await;
    let (_a, a_id) = connect(&addr).await;
    let (_b, b_id) = connect(&addr).await;
    assert_ne!(a_id, b_id);
}

#[tokio::test]
async fn test_heartbeat_is_acknowledged() {
    let addr = start_server().await;
    let (mut ws, _) = connect(&addr).await;

    send(&mut ws, ClientMessage::Heartbeat { client_time: 4242 }).await;
    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.seq, 2);
    match envelope.message {
        ServerMessage::HeartbeatAck {
            client_time,
            server_time,
        } => {
            assert_eq!(client_time, 4242);
            assert!(server_time > 0);
        }
        other => panic!("expected heartbeat-ack, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frame_gets_error_and_connection_survives() {
    let addr = start_server().await;
    let (mut ws, _) = connect(&addr).await;

    ws.send(Message::Text("definitely not json".into())).await.unwrap();
    match recv(&mut ws).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected error, got {other:?}"),
    }

    ws.send(Message::Text(r#"{"seq":1,"timestamp":0,"message":{"type":"teleport"}}"#.into()))
        .await
        .unwrap();
    assert!(matches!(recv(&mut ws).await, ServerMessage::Error { code: 400, .. }));

    send(&mut ws, ClientMessage::Heartbeat { client_time: 1 }).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::HeartbeatAck { .. }));
}

#[tokio::test]
async fn test_disconnect_message_closes_connection() {
    let addr = start_server().await;
    let (mut ws, _) = connect(&addr).await;

    send(
        &mut ws,
        ClientMessage::Disconnect {
            reason: "bye".into(),
        },
    )
    .await;
    expect_closed(&mut ws).await;
}

#[tokio::test]
async fn test_idle_connection_is_dropped() {
    let addr = start_server_with(DuetServerBuilder::new().idle_timeout(Duration::from_millis(200))).await;
    let (mut ws, _) = connect(&addr).await;
    expect_closed(&mut ws).await;
}

#[tokio::test]
async fn test_silent_socket_does_not_block_other_clients() {
    let addr = start_server().await;

    // Opens TCP and never sends the upgrade request.
    let _silent = tokio::net::TcpStream::connect(&addr).await.unwrap();

    let (_ws, client_id) = tokio::time::timeout(Duration::from_secs(3), connect(&addr))
        .await
        .expect("a stalled handshake must not hold up accepts");
    assert!(client_id.0 > 0);
}

#[tokio::test]
async fn test_disallowed_origin_is_refused() {
    let addr = start_server_with(
        DuetServerBuilder::new().allowed_origins(vec!["https://duet.example".into()]),
    )
    .await;

    let mut request = format!("ws://{addr}").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://elsewhere.example".parse().unwrap());
    assert!(tokio_tungstenite::connect_async(request).await.is_err());

    let mut request = format!("ws://{addr}").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://duet.example".parse().unwrap());
    let (mut ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("allowed origin should connect");
    assert!(matches!(recv(&mut ws).await, ServerMessage::Welcome { .. }));
}

// =========================================================================
// Matchmaking over the wire
// =========================================================================

#[tokio::test]
async fn test_lone_start_waits() {
    let addr = start_server().await;
    let (mut ws, _) = connect(&addr).await;

    send(&mut ws, ClientMessage::Start).await;
    match recv(&mut ws).await {
        ServerMessage::Waiting { message } => assert_eq!(message, "Waiting for another user..."),
        other => panic!("expected waiting, got {other:?}"),
    }
}

#[tokio::test]
async fn test_two_starts_pair_up() {
    let addr = start_server().await;
    let (_a, a_id, _b, b_id, room_id) = paired(&addr).await;
    assert_eq!(room_id, RoomId::for_pair(b_id, a_id));
}

#[tokio::test]
async fn test_next_rematches_with_waiting_client() {
    let addr = start_server().await;
    let (mut a, a_id, mut b, _b_id, room_id) = paired(&addr).await;
    let (mut c, c_id) = connect(&addr).await;
    send(&mut c, ClientMessage::Start).await;
    expect_waiting(&mut c).await;

    send(
        &mut a,
        ClientMessage::Next {
            room_id: Some(room_id.clone()),
            partner_id: None,
        },
    )
    .await;

    assert_eq!(recv(&mut b).await, ServerMessage::UserLeft { room_id });
    assert_eq!(recv(&mut b).await, ServerMessage::ClearSessionState);
    let (_, partner) = expect_join(&mut a, a_id).await;
    assert_eq!(partner, c_id);
    let (_, partner) = expect_join(&mut c, c_id).await;
    assert_eq!(partner, a_id);
}

#[tokio::test]
async fn test_stop_tells_partner_to_reset() {
    let addr = start_server().await;
    let (mut a, _a_id, mut b, b_id, room_id) = paired(&addr).await;

    send(
        &mut a,
        ClientMessage::Stop {
            room_id: Some(room_id.clone()),
            partner_id: Some(b_id),
        },
    )
    .await;

    assert_eq!(recv(&mut b).await, ServerMessage::UserLeft { room_id });
    assert_eq!(recv(&mut b).await, ServerMessage::ClearSessionState);

    // Both are idle again; A starting now just waits.
    send(&mut a, ClientMessage::Start).await;
    expect_waiting(&mut a).await;
}

#[tokio::test]
async fn test_partner_disconnect_sends_user_left() {
    let addr = start_server().await;
    let (mut a, a_id, b, _b_id, room_id) = paired(&addr).await;

    drop(b);
    assert_eq!(recv(&mut a).await, ServerMessage::UserLeft { room_id });
    // A is back in line without asking.
    expect_waiting(&mut a).await;

    let (mut c, c_id) = connect(&addr).await;
    send(&mut c, ClientMessage::Start).await;
    let (_, partner) = expect_join(&mut c, c_id).await;
    assert_eq!(partner, a_id);
    let (_, partner) = expect_join(&mut a, a_id).await;
    assert_eq!(partner, c_id);
}

// =========================================================================
// Relay
// =========================================================================

#[tokio::test]
async fn test_relay_forwards_payload_with_sender() {
    let addr = start_server().await;
    let (mut a, a_id, mut b, b_id, _) = paired(&addr).await;

    let offer = json!({ "type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 0.0.0.0" });
    send(
        &mut a,
        ClientMessage::Relay {
            kind: RelayKind::Offer,
            to: b_id,
            data: offer.clone(),
        },
    )
    .await;

    assert_eq!(
        recv(&mut b).await,
        ServerMessage::Relay {
            kind: RelayKind::Offer,
            from: a_id,
            data: offer,
        }
    );
}

#[tokio::test]
async fn test_relay_does_not_require_a_shared_room() {
    let addr = start_server().await;
    let (mut a, a_id) = connect(&addr).await;
    let (mut b, b_id) = connect(&addr).await;

    send(
        &mut a,
        ClientMessage::Relay {
            kind: RelayKind::ChatMessage,
            to: b_id,
            data: json!({ "text": "hello" }),
        },
    )
    .await;
    assert!(matches!(
        recv(&mut b).await,
        ServerMessage::Relay { kind: RelayKind::ChatMessage, from, .. } if from == a_id
    ));
}

#[tokio::test]
async fn test_relay_to_absent_target_is_silently_dropped() {
    let addr = start_server().await;
    let (mut a, _) = connect(&addr).await;

    send(
        &mut a,
        ClientMessage::Relay {
            kind: RelayKind::IceCandidate,
            to: ClientId(u64::MAX),
            data: json!({ "candidate": "..." }),
        },
    )
    .await;
    send(&mut a, ClientMessage::Heartbeat { client_time: 7 }).await;

    // No error in between: the very next message is the ack.
    assert!(matches!(
        recv(&mut a).await,
        ServerMessage::HeartbeatAck { client_time: 7, .. }
    ));
}

// =========================================================================
// Presence
// =========================================================================

#[tokio::test]
async fn test_presence_broadcast_reaches_clients() {
    let presence = PresenceConfig {
        interval: Duration::from_millis(100),
        formula: PresenceFormula::Connected,
        initial_jitter: Duration::ZERO,
    };
    let addr = start_server_with(DuetServerBuilder::new().presence(presence)).await;
    let (mut a, _) = connect(&addr).await;
    let (_b, _) = connect(&addr).await;

    // The first broadcast may predate B's arrival; wait for one that sees both.
    let mut last = None;
    for _ in 0..10 {
        if let ServerMessage::ActiveParticipantCount { count } = recv(&mut a).await {
            last = Some(count);
            if count == 2 {
                break;
            }
        }
    }
    assert_eq!(last, Some(2));
}

#[tokio::test]
async fn test_engaged_presence_counts_waiting_and_seated() {
    let presence = PresenceConfig {
        interval: Duration::from_millis(100),
        formula: PresenceFormula::Engaged,
        initial_jitter: Duration::ZERO,
    };
    let addr = start_server_with(DuetServerBuilder::new().presence(presence)).await;
    let (mut idle, _) = connect(&addr).await;
    let (mut waiting, _) = connect(&addr).await;
    send(&mut waiting, ClientMessage::Start).await;

    let mut last = None;
    for _ in 0..10 {
        if let ServerMessage::ActiveParticipantCount { count } = recv(&mut idle).await {
            last = Some(count);
            if count == 1 {
                break;
            }
        }
    }
    assert_eq!(last, Some(1), "only the waiting client is engaged");
}
