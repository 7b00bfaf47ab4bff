//! Core protocol types for Duet's wire format.
//!
//! Everything here is serialized to JSON and sent over the WebSocket.
//! Message enums are internally tagged with a kebab-case `"type"` field
//! and camelCase fields, which is what browser clients expect:
//!
//! ```json
//! { "type": "join-room", "roomId": "c-1:c-2", "partnerId": 2, "selfId": 1 }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a connected client.
///
/// Assigned from the transport's connection id when the socket is
/// accepted and stable for the lifetime of that connection. Serialized as
/// a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c-{}", self.0)
    }
}

/// A unique identifier for a two-party room.
///
/// Derived from the two members, initiator first. Since a client is in at
/// most one room at a time, no two live rooms can share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Builds the id for a room formed by `initiator` and `candidate`.
    pub fn for_pair(initiator: ClientId, candidate: ClientId) -> Self {
        Self(format!("{initiator}:{candidate}"))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Relay kinds
// ---------------------------------------------------------------------------

/// The kind of payload being relayed between two clients.
///
/// The server never looks inside the payload; the kind is forwarded so the
/// receiving client knows how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayKind {
    /// Connection-negotiation offer.
    Offer,
    /// Connection-negotiation answer.
    Answer,
    /// Network candidate for the peer connection.
    IceCandidate,
    /// Chat text.
    ChatMessage,
    #[serde(rename = "user-typing")]
    TypingStart,
    #[serde(rename = "stop-typing")]
    TypingStop,
    AudioMuted,
    VideoMuted,
}

impl fmt::Display for RelayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
            Self::ChatMessage => "chat-message",
            Self::TypingStart => "user-typing",
            Self::TypingStop => "stop-typing",
            Self::AudioMuted => "audio-muted",
            Self::VideoMuted => "video-muted",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// "Find me a partner."
    Start,

    /// "Leave this room and find me someone else."
    ///
    /// Both fields are optional: a client that is not in a room just gets
    /// matched.
    Next {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        partner_id: Option<ClientId>,
    },

    /// "Leave this room and stop looking."
    Stop {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        partner_id: Option<ClientId>,
    },

    /// Forward `data` to client `to`, untouched.
    Relay {
        kind: RelayKind,
        to: ClientId,
        #[serde(default)]
        data: serde_json::Value,
    },

    /// Keep-alive. `client_time` is echoed back for RTT measurement.
    Heartbeat { client_time: u64 },

    /// "I'm leaving." The server closes the connection.
    Disconnect {
        #[serde(default)]
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First message on every connection: the client's own id.
    Welcome { client_id: ClientId, server_time: u64 },

    /// You have been paired. Address `partner_id` in future relays.
    JoinRoom {
        room_id: RoomId,
        partner_id: ClientId,
        self_id: ClientId,
    },

    /// Nobody is available yet; you are queued.
    Waiting { message: String },

    /// Your partner left the room.
    UserLeft { room_id: RoomId },

    /// Drop any chat history or other per-session UI state.
    ClearSessionState,

    /// A relayed payload from `from`.
    Relay {
        kind: RelayKind,
        from: ClientId,
        data: serde_json::Value,
    },

    /// Periodic presence broadcast.
    ActiveParticipantCount { count: usize },

    /// Reply to a heartbeat.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// `code` follows HTTP conventions (400 = bad request).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wire wrapper around every message, in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<M> {
    /// Per-connection, per-direction sequence number.
    pub seq: u64,

    /// Milliseconds since the connection was accepted.
    pub timestamp: u64,

    /// The message itself.
    pub message: M,
}

impl<M> Envelope<M> {
    /// Wraps `message` with the given sequence number and timestamp.
    pub fn new(seq: u64, timestamp: u64, message: M) -> Self {
        Self { seq, timestamp, message }
    }
}
