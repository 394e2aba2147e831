//! Boundary to the chat network transport.
//!
//! The transport owns the wire protocol. The bot only sees a [`Session`]
//! handle for outbound calls and a typed event stream per connection.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{InboundMessage, SessionError};

/// Opaque credential material, persisted verbatim by the bot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub serde_json::Value);

impl Credentials {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion(pub [u32; 3]);

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, patch] = self.0;
        write!(f, "{major}.{minor}.{patch}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Why the network closed the connection, keyed by its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    ConnectionClosed,
    ConnectionLost,
    ConnectionReplaced,
    LoggedOut,
    BadSession,
    RestartRequired,
    MultideviceMismatch,
    Other(u16),
}

impl DisconnectCause {
    #[must_use]
    pub const fn from_status(code: u16) -> Self {
        match code {
            428 => Self::ConnectionClosed,
            408 => Self::ConnectionLost,
            440 => Self::ConnectionReplaced,
            401 => Self::LoggedOut,
            500 => Self::BadSession,
            515 => Self::RestartRequired,
            411 => Self::MultideviceMismatch,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::ConnectionClosed => 428,
            Self::ConnectionLost => 408,
            Self::ConnectionReplaced => 440,
            Self::LoggedOut => 401,
            Self::BadSession => 500,
            Self::RestartRequired => 515,
            Self::MultideviceMismatch => 411,
            Self::Other(code) => code,
        }
    }

    /// Only an explicit logout ends the session for good.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionUpdate {
    pub state: Option<ConnectionState>,
    pub disconnect: Option<DisconnectCause>,
    /// Pairing code to render as a QR for a new login.
    pub pairing: Option<String>,
}

impl ConnectionUpdate {
    #[must_use]
    pub const fn open() -> Self {
        Self {
            state: Some(ConnectionState::Open),
            disconnect: None,
            pairing: None,
        }
    }

    #[must_use]
    pub const fn closed(cause: DisconnectCause) -> Self {
        Self {
            state: Some(ConnectionState::Closed),
            disconnect: Some(cause),
            pairing: None,
        }
    }

    #[must_use]
    pub fn pairing(payload: impl Into<String>) -> Self {
        Self {
            state: None,
            disconnect: None,
            pairing: Some(payload.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Freshly received messages.
    Notify,
    /// History sync or catch-up after reconnect.
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBatch {
    pub messages: Vec<InboundMessage>,
    pub kind: BatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CredsUpdate(Credentials),
    ConnectionUpdate(ConnectionUpdate),
    Messages(MessageBatch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Image,
    Video,
    Audio,
    Document,
}

impl PayloadKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub kind: PayloadKind,
    pub bytes: Vec<u8>,
    pub mimetype: String,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    pub gif_playback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text(String),
    Media(MediaPayload),
}

impl OutboundPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMetadata {
    pub id: String,
    pub subject: String,
    pub participants: usize,
}

/// Outbound surface of a live connection.
#[async_trait]
pub trait Session: Send + Sync {
    async fn send(&self, to: &str, payload: OutboundPayload) -> Result<(), SessionError>;

    /// Directory lookup; an empty result means the address is not registered.
    async fn lookup_address(&self, address: &str) -> Result<Vec<String>, SessionError>;

    async fn group_metadata(&self, address: &str) -> Result<Option<GroupMetadata>, SessionError>;

    async fn fetch_media_bytes(&self, message: &InboundMessage) -> Result<Vec<u8>, SessionError>;
}

/// Everything a successful connect hands back.
pub struct Connection {
    pub session: Arc<dyn Session>,
    pub events: mpsc::Receiver<SessionEvent>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Protocol version the remote service currently expects.
    async fn latest_version(&self) -> Result<ProtocolVersion, SessionError>;

    async fn connect(
        &self,
        credentials: Credentials,
        version: ProtocolVersion,
    ) -> Result<Connection, SessionError>;
}
