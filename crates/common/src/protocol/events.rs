// Event types for the pairsync relay WebSocket protocol.
//
// Every frame is a JSON object tagged by `type` with the event name
// (`join-session`, `receive-code`, ...). Payload fields are snake_case.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Identity of one live connection to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Room key of a collaboration session.
///
/// Sessions are numbered by the web application; the relay keys rooms by the
/// decimal string form so `42` and `"42"` address the same room. Serializes
/// as a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn from_id(id: u64) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for SessionKey {
    fn from(value: u64) -> Self {
        Self::from_id(value)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SessionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawSessionId {
            Number(u64),
            Text(String),
        }

        match RawSessionId::deserialize(deserializer)? {
            RawSessionId::Number(id) => Ok(Self::from_id(id)),
            RawSessionId::Text(key) if key.trim().is_empty() => {
                Err(D::Error::custom("session id must not be empty"))
            }
            RawSessionId::Text(key) => Ok(Self(key)),
        }
    }
}

/// An editor payload, usually a Quill-style `{ "ops": [...] }` delta.
///
/// Opaque to the relay: any JSON value is accepted and forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeDelta(pub serde_json::Value);

/// Client -> Server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join the room of a session.
    JoinSession { session_id: SessionKey },

    /// Incremental edit, relayed to the other room members.
    SendCode { delta: CodeDelta },

    /// Answer to a `get-full-code` request, relayed to `target_id` only.
    SendFullCode { code: CodeDelta, target_id: ConnectionId },

    /// Final solution; completes the session.
    SubmitCode { session_id: SessionKey, code: String },
}

impl ClientEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinSession { .. } => "join-session",
            Self::SendCode { .. } => "send-code",
            Self::SendFullCode { .. } => "send-full-code",
            Self::SubmitCode { .. } => "submit-code",
        }
    }
}

/// Server -> Client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First frame on every connection.
    Connected { connection_id: ConnectionId },

    /// A new member joined; reply with `send-full-code` targeting `requester_id`.
    GetFullCode { requester_id: ConnectionId },

    /// Full document from the partner.
    ReceiveFullCode { code: CodeDelta },

    /// Remote incremental edit.
    ReceiveCode { delta: CodeDelta },

    CompleteSession,

    PartnerConnect,

    PartnerDisconnect,

    /// The partner never (re)joined within the abandonment window.
    TerminateSession,

    /// The previous client frame could not be processed.
    Error { code: String, message: String },
}

impl ServerEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::GetFullCode { .. } => "get-full-code",
            Self::ReceiveFullCode { .. } => "receive-full-code",
            Self::ReceiveCode { .. } => "receive-code",
            Self::CompleteSession => "complete-session",
            Self::PartnerConnect => "partner-connect",
            Self::PartnerDisconnect => "partner-disconnect",
            Self::TerminateSession => "terminate-session",
            Self::Error { .. } => "error",
        }
    }
}
