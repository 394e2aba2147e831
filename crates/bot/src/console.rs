//! Local transport: stdin lines become inbound messages, sends are printed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt as _, BufReader},
    sync::mpsc,
};
use tracing::{debug, info};

use bot_core::{
    BatchKind, Connection, ConnectionUpdate, Credentials, DisconnectCause, GroupMetadata,
    InboundMessage, MessageBatch, OutboundPayload, ProtocolVersion, Session, SessionError,
    SessionEvent, Transport,
    address::{self, AddressKind},
};

const CONSOLE_VERSION: ProtocolVersion = ProtocolVersion([2, 3000, 0]);

#[derive(Debug, Clone)]
pub struct ConsoleTransport {
    sender: String,
    groups: Arc<[String]>,
}

impl ConsoleTransport {
    pub fn new(sender: &str, groups: Vec<String>) -> Self {
        Self {
            sender: address::individual(sender),
            groups: groups.into(),
        }
    }
}

#[derive(Debug)]
struct ConsoleSession {
    groups: Arc<[String]>,
}

/// One line of console output for an outbound payload.
fn describe(to: &str, payload: &OutboundPayload) -> String {
    match payload {
        OutboundPayload::Text(text) => format!("-> {to}\n{text}"),
        OutboundPayload::Media(media) => format!(
            "-> {to} [{} {} bytes, {}] {}",
            media.kind.as_str(),
            media.bytes.len(),
            media.mimetype,
            media.caption.as_deref().unwrap_or_default()
        ),
    }
}

#[async_trait]
impl Session for ConsoleSession {
    async fn send(&self, to: &str, payload: OutboundPayload) -> Result<(), SessionError> {
        println!("{}", describe(to, &payload));
        Ok(())
    }

    async fn lookup_address(&self, address: &str) -> Result<Vec<String>, SessionError> {
        Ok(match address::kind_of(address) {
            AddressKind::Individual => vec![address.to_owned()],
            AddressKind::Group | AddressKind::Other => Vec::new(),
        })
    }

    async fn group_metadata(&self, address: &str) -> Result<Option<GroupMetadata>, SessionError> {
        Ok(self
            .groups
            .iter()
            .find(|g| g.as_str() == address)
            .map(|g| GroupMetadata {
                id: g.clone(),
                subject: "console group".to_owned(),
                participants: 1,
            }))
    }

    async fn fetch_media_bytes(&self, _message: &InboundMessage) -> Result<Vec<u8>, SessionError> {
        Err(SessionError::Media("the console carries no attachments".to_owned()))
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn latest_version(&self) -> Result<ProtocolVersion, SessionError> {
        Ok(CONSOLE_VERSION)
    }

    /// Ends with a logout once stdin is exhausted.
    async fn connect(
        &self,
        _credentials: Credentials,
        _version: ProtocolVersion,
    ) -> Result<Connection, SessionError> {
        let (tx, rx) = mpsc::channel(32);
        tx.send(SessionEvent::ConnectionUpdate(ConnectionUpdate::open()))
            .await
            .map_err(SessionError::transport)?;

        let sender = self.sender.clone();
        tokio::spawn(async move {
            info!(sender = %sender, "Console ready: type messages, Ctrl+D to quit");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut seq: u64 = 0;
            while let Ok(Some(line)) = lines.next_line().await {
                seq += 1;
                let message = InboundMessage::text(format!("CONSOLE{seq}"), sender.as_str(), line);
                let batch = MessageBatch {
                    messages: vec![message],
                    kind: BatchKind::Notify,
                };
                if tx.send(SessionEvent::Messages(batch)).await.is_err() {
                    return;
                }
            }
            debug!("Console input closed");
            let _ = tx
                .send(SessionEvent::ConnectionUpdate(ConnectionUpdate::closed(
                    DisconnectCause::LoggedOut,
                )))
                .await;
        });

        Ok(Connection {
            session: Arc::new(ConsoleSession {
                groups: Arc::clone(&self.groups),
            }),
            events: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_core::{MediaPayload, PayloadKind};

    fn session() -> ConsoleSession {
        ConsoleSession {
            groups: vec!["120363@g.us".to_owned()].into(),
        }
    }

    #[test]
    fn sender_gets_individual_suffix() {
        let transport = ConsoleTransport::new("5491100", Vec::new());
        assert_eq!(transport.sender, "5491100@s.whatsapp.net");
    }

    #[tokio::test]
    async fn individuals_resolve_and_known_groups_have_metadata() {
        let s = session();
        assert_eq!(s.lookup_address("1@s.whatsapp.net").await.unwrap().len(), 1);
        assert!(s.lookup_address("1@g.us").await.unwrap().is_empty());
        assert!(s.group_metadata("120363@g.us").await.unwrap().is_some());
        assert!(s.group_metadata("999@g.us").await.unwrap().is_none());
    }

    #[test]
    fn media_is_described_not_dumped() {
        let payload = OutboundPayload::Media(MediaPayload {
            kind: PayloadKind::Image,
            bytes: vec![0; 42],
            mimetype: "image/png".to_owned(),
            caption: Some("hi".to_owned()),
            file_name: None,
            gif_playback: false,
        });
        assert_eq!(describe("x@g.us", &payload), "-> x@g.us [image 42 bytes, image/png] hi");
    }
}
