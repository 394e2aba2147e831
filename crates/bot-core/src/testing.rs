//! In-memory session and transport doubles for tests across the workspace.

use core::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    Connection, Credentials, GroupMetadata, InboundMessage, OutboundPayload, PluginContext,
    PluginRegistry, ProtocolVersion, Session, SessionError, SessionEvent, Transport,
};

/// Build the context a router would hand to a plugin for `message`.
#[must_use]
pub fn context(
    session: &Arc<RecordingSession>,
    message: InboundMessage,
    registry: Arc<PluginRegistry>,
) -> PluginContext {
    let text = message.extract_text().unwrap_or_default();
    let trigger = text
        .split_whitespace()
        .next()
        .map(crate::normalize_cmd)
        .unwrap_or_default();
    PluginContext {
        session: Arc::clone(session) as Arc<dyn Session>,
        message: Arc::new(message),
        text: Arc::from(text),
        trigger,
        registry,
    }
}

/// Records every send and answers lookups from fixed tables.
#[derive(Debug, Default)]
pub struct RecordingSession {
    sent: Mutex<Vec<(String, OutboundPayload)>>,
    contacts: HashSet<String>,
    groups: HashMap<String, GroupMetadata>,
    group_delay: Option<Duration>,
    media: Option<Vec<u8>>,
    fail_sends: bool,
}

impl RecordingSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_contact(mut self, address: &str) -> Self {
        self.contacts.insert(address.to_owned());
        self
    }

    #[must_use]
    pub fn with_group(mut self, address: &str) -> Self {
        self.groups.insert(
            address.to_owned(),
            GroupMetadata {
                id: address.to_owned(),
                subject: "test group".to_owned(),
                participants: 3,
            },
        );
        self
    }

    /// Delay every group metadata answer.
    #[must_use]
    pub const fn with_group_delay(mut self, delay: Duration) -> Self {
        self.group_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_media(mut self, bytes: &[u8]) -> Self {
        self.media = Some(bytes.to_vec());
        self
    }

    #[must_use]
    pub const fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    #[must_use]
    pub fn sent(&self) -> Vec<(String, OutboundPayload)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Text payloads only, as `(to, text)`.
    #[must_use]
    pub fn sent_texts(&self) -> Vec<(String, String)> {
        self.sent()
            .into_iter()
            .filter_map(|(to, payload)| match payload {
                OutboundPayload::Text(text) => Some((to, text)),
                OutboundPayload::Media(_) => None,
            })
            .collect()
    }

    /// Poll until at least `count` payloads were sent or the deadline passes.
    pub async fn wait_for_sends(&self, count: usize, deadline: Duration) -> bool {
        let step = Duration::from_millis(10);
        let mut waited = Duration::ZERO;
        while waited < deadline {
            if self.sent.lock().unwrap_or_else(PoisonError::into_inner).len() >= count {
                return true;
            }
            tokio::time::sleep(step).await;
            waited += step;
        }
        false
    }
}

#[async_trait]
impl Session for RecordingSession {
    async fn send(&self, to: &str, payload: OutboundPayload) -> Result<(), SessionError> {
        if self.fail_sends {
            return Err(SessionError::Transport("send refused".to_owned()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((to.to_owned(), payload));
        Ok(())
    }

    async fn lookup_address(&self, address: &str) -> Result<Vec<String>, SessionError> {
        if self.contacts.contains(address) {
            Ok(vec![address.to_owned()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn group_metadata(&self, address: &str) -> Result<Option<GroupMetadata>, SessionError> {
        if let Some(delay) = self.group_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.groups.get(address).cloned())
    }

    async fn fetch_media_bytes(&self, _message: &InboundMessage) -> Result<Vec<u8>, SessionError> {
        self.media
            .clone()
            .ok_or_else(|| SessionError::Media("no media scripted".to_owned()))
    }
}

/// Hands out one pre-scripted event list per `connect` call.
#[derive(Debug)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<SessionEvent>>>,
    connects: AtomicUsize,
    credentials_seen: Mutex<Vec<Credentials>>,
    session: Arc<RecordingSession>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new(session: Arc<RecordingSession>, scripts: Vec<Vec<SessionEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            connects: AtomicUsize::new(0),
            credentials_seen: Mutex::new(Vec::new()),
            session,
        }
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn credentials_seen(&self) -> Vec<Credentials> {
        self.credentials_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn latest_version(&self) -> Result<ProtocolVersion, SessionError> {
        Ok(ProtocolVersion([2, 3000, 1]))
    }

    async fn connect(
        &self,
        credentials: Credentials,
        _version: ProtocolVersion,
    ) -> Result<Connection, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.credentials_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(credentials);
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| SessionError::Transport("script exhausted".to_owned()))?;

        let (tx, rx) = mpsc::channel(script.len().max(1));
        for event in script {
            tx.try_send(event)
                .map_err(|e| SessionError::Transport(e.to_string()))?;
        }
        let session: Arc<dyn Session> = Arc::clone(&self.session) as Arc<dyn Session>;
        Ok(Connection {
            session,
            events: rx,
        })
    }
}
