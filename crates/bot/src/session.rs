//! Session lifecycle: connect, drive one connection's events, reconnect.
//!
//! The manager is also the [`Session`] every other component sends through,
//! so callers never hold a handle to a dead connection.

use core::time::Duration;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use bot_core::{
    ConnectionState, ConnectionUpdate, DisconnectCause, EventBus, GroupMetadata, InboundMessage,
    MessageBatch, OutboundPayload, ProtocolVersion, Session, SessionError, SessionEvent,
    Transport, send_text_to,
};

use crate::credentials::CredentialStore;

const FALLBACK_VERSION: ProtocolVersion = ProtocolVersion([2, 3000, 1_015_901_307]);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    /// Logged out remotely: do not reconnect.
    Terminal(DisconnectCause),
    /// Anything else, including the event stream ending without a close.
    Dropped(Option<DisconnectCause>),
}

struct Live {
    /// Published to callers only once the connection reports `Open`.
    session: Arc<dyn Session>,
    events: mpsc::Receiver<SessionEvent>,
    version: ProtocolVersion,
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    bus: EventBus,
    operator: String,
    messages: mpsc::Sender<InboundMessage>,
    current: RwLock<Option<Arc<dyn Session>>>,
    retry_delay: Duration,
    tracker: TaskTracker,
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionManager")
            .field("credentials", &self.credentials)
            .field("operator", &self.operator)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: CredentialStore,
        bus: EventBus,
        operator: impl Into<String>,
        messages: mpsc::Sender<InboundMessage>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            transport,
            credentials,
            bus,
            operator: operator.into(),
            messages,
            current: RwLock::new(None),
            retry_delay: RECONNECT_DELAY,
            tracker,
        }
    }

    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Open one connection with the stored credentials.
    async fn start(&self) -> Result<Live> {
        let credentials = self.credentials.load()?;
        let version = match self.transport.latest_version().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, fallback = %FALLBACK_VERSION, "Could not fetch protocol version");
                FALLBACK_VERSION
            }
        };
        info!(version = %version, fresh = credentials.is_empty(), "Connecting");
        let connection = self
            .transport
            .connect(credentials, version)
            .await
            .context("connecting transport")?;
        Ok(Live {
            session: connection.session,
            events: connection.events,
            version,
        })
    }

    /// Connect, then keep the session alive until it is logged out.
    ///
    /// Only the first connect is allowed to fail; later attempts are retried.
    pub async fn run(&self) -> Result<Closure> {
        let mut live = self.start().await?;
        loop {
            let closure = self.drive(&mut live).await;
            *self.current.write().await = None;
            match closure {
                Closure::Terminal(cause) => {
                    warn!(cause = ?cause, "Session logged out; not reconnecting");
                    return Ok(closure);
                }
                Closure::Dropped(cause) => info!(cause = ?cause, "Connection dropped; reconnecting"),
            }
            live = self.reconnect().await;
        }
    }

    async fn reconnect(&self) -> Live {
        loop {
            match self.start().await {
                Ok(live) => return live,
                Err(e) => {
                    warn!(error = %e, retry_in = ?self.retry_delay, "Reconnect failed");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn drive(&self, live: &mut Live) -> Closure {
        while let Some(event) = live.events.recv().await {
            match event {
                SessionEvent::CredsUpdate(creds) => {
                    if let Err(e) = self.credentials.save(&creds) {
                        warn!(error = %e, "Failed to persist credentials");
                    } else {
                        debug!("Credentials persisted");
                    }
                }
                SessionEvent::ConnectionUpdate(update) => {
                    if let Some(closure) = self.on_connection_update(update, live).await {
                        return closure;
                    }
                }
                SessionEvent::Messages(batch) => self.forward(batch).await,
            }
        }
        Closure::Dropped(None)
    }

    async fn on_connection_update(
        &self,
        update: ConnectionUpdate,
        live: &Live,
    ) -> Option<Closure> {
        if let Some(payload) = update.pairing {
            info!("Pairing code received; scan it from /bot/qrcode");
            self.bus.publish_pairing(payload);
        }
        match update.state {
            Some(ConnectionState::Open) => {
                info!("Connection open");
                *self.current.write().await = Some(Arc::clone(&live.session));
                self.announce(Arc::clone(&live.session), live.version);
                None
            }
            Some(ConnectionState::Closed) => Some(match update.disconnect {
                Some(cause) if cause.is_terminal() => Closure::Terminal(cause),
                cause => Closure::Dropped(cause),
            }),
            Some(ConnectionState::Connecting) | None => None,
        }
    }

    /// Tracked fire-and-forget bootstrap notification to the operator.
    fn announce(&self, session: Arc<dyn Session>, version: ProtocolVersion) {
        let operator = self.operator.clone();
        self.tracker.spawn(async move {
            let host = hostname().await;
            let text = format!("*Bot online on host:* {host}\n_protocol {version}_");
            if let Err(e) = send_text_to(session.as_ref(), &operator, text).await {
                warn!(error = %e, "Failed to send bootstrap notification");
            }
        });
    }

    async fn forward(&self, batch: MessageBatch) {
        debug!(count = batch.messages.len(), kind = ?batch.kind, "Message batch");
        for message in batch.messages {
            if self.messages.send(message).await.is_err() {
                warn!("Router is gone; dropping inbound messages");
                return;
            }
        }
    }

    async fn live(&self) -> Result<Arc<dyn Session>, SessionError> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(SessionError::NoActiveSession)
    }
}

async fn hostname() -> String {
    let from_cmd = tokio::process::Command::new("hostname")
        .output()
        .await
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_owned())
        .filter(|h| !h.is_empty());
    from_cmd
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_owned())
}

#[async_trait]
impl Session for SessionManager {
    async fn send(&self, to: &str, payload: OutboundPayload) -> Result<(), SessionError> {
        self.live().await?.send(to, payload).await
    }

    async fn lookup_address(&self, address: &str) -> Result<Vec<String>, SessionError> {
        self.live().await?.lookup_address(address).await
    }

    async fn group_metadata(&self, address: &str) -> Result<Option<GroupMetadata>, SessionError> {
        self.live().await?.group_metadata(address).await
    }

    async fn fetch_media_bytes(&self, message: &InboundMessage) -> Result<Vec<u8>, SessionError> {
        self.live().await?.fetch_media_bytes(message).await
    }
}
