pub mod address;
mod bus;
mod error;
mod message;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod transport;

pub use bus::{EventBus, PAIRING_TOPIC};
pub use error::SessionError;
pub use message::{InboundMessage, MediaInfo, MediaKind, MessagePart, StubType};
pub use transport::{
    BatchKind, Connection, ConnectionState, ConnectionUpdate, Credentials, DisconnectCause,
    GroupMetadata, MediaPayload, MessageBatch, OutboundPayload, PayloadKind, ProtocolVersion,
    Session, SessionEvent, Transport,
};

use core::fmt;
use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Per-invocation context handed to a command plugin.
#[derive(Clone)]
pub struct PluginContext {
    pub session: Arc<dyn Session>,
    pub message: Arc<InboundMessage>,
    /// Normalized text the command was parsed from.
    pub text: Arc<str>,
    /// Command token that selected the plugin, e.g. `/to`.
    pub trigger: String,
    pub registry: Arc<PluginRegistry>,
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("message", &self.message.id)
            .field("origin", &self.message.origin)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn help(&self) -> &'static str;
    /// Default spec: triggers and config used when nothing is configured.
    fn spec(&self) -> PluginSpec;
    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PluginTriggers {
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginSpec {
    pub id: String,
    #[serde(default = "enabled_true")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: PluginTriggers,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

const fn enabled_true() -> bool {
    true
}

impl PluginSpec {
    pub fn new(id: impl Into<String>, commands: &[&str]) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            triggers: PluginTriggers {
                commands: commands.iter().map(|c| (*c).to_owned()).collect(),
            },
            config: serde_yaml::Value::default(),
        }
    }
}

#[derive(Clone)]
pub struct PluginEntry {
    pub spec: PluginSpec,
    pub plugin: Arc<dyn Plugin>,
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<String, PluginEntry>,
    by_command: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry").finish_non_exhaustive()
    }
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, spec: PluginSpec, plugin: Arc<dyn Plugin>) -> Option<PluginEntry> {
        let mut inner = self.inner.write().await;
        let id = spec.id.clone();
        let previous = inner.by_id.insert(
            id.clone(),
            PluginEntry {
                spec: spec.clone(),
                plugin,
            },
        );
        inner.by_command.retain(|_, existing| *existing != id);
        for cmd in &spec.triggers.commands {
            inner.by_command.insert(normalize_cmd(cmd), id.clone());
        }
        previous
    }

    pub async fn entry(&self, id: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner.by_id.get(id).cloned()
    }

    pub async fn entry_by_command(&self, token: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner
            .by_command
            .get(&normalize_cmd(token))
            .and_then(|id| inner.by_id.get(id))
            .cloned()
    }

    pub async fn entries(&self) -> Vec<(String, PluginEntry)> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }
}

/// Command tokens are matched case-insensitively with a leading `/`.
#[must_use]
pub fn normalize_cmd(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    if lowered.starts_with('/') {
        lowered
    } else {
        format!("/{lowered}")
    }
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Reply in the chat the command came from.
pub async fn reply(ctx: &PluginContext, text: impl Into<String>) -> Result<()> {
    send_text_to(ctx.session.as_ref(), &ctx.message.origin, text).await
}

pub async fn send_text_to(session: &dyn Session, to: &str, text: impl Into<String>) -> Result<()> {
    session.send(to, OutboundPayload::text(text)).await?;
    Ok(())
}
