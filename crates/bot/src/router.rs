use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use bot_core::{
    InboundMessage, PluginContext, PluginRegistry, Session, StubType, normalize_cmd, truncate,
};

/// Why a message never reached a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    FromSelf,
    GroupCreate,
    NoText,
    NotACommand,
    UnknownCommand,
    Disabled,
}

/// Text a message would be dispatched on, if it passes the filters.
pub fn accept(message: &InboundMessage) -> Result<String, Skip> {
    if message.from_me {
        return Err(Skip::FromSelf);
    }
    if message.stub == Some(StubType::GroupCreate) {
        return Err(Skip::GroupCreate);
    }
    message.extract_text().ok_or(Skip::NoText)
}

/// `(verb, args)`: the verb is everything up to the first whitespace.
#[must_use]
pub fn split_command(text: &str) -> (&str, &str) {
    text.split_once(char::is_whitespace)
        .map_or((text, ""), |(verb, args)| (verb, args.trim_start()))
}

#[derive(Clone)]
pub struct CommandRouter {
    registry: Arc<PluginRegistry>,
    session: Arc<dyn Session>,
}

impl core::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl CommandRouter {
    pub fn new(registry: Arc<PluginRegistry>, session: Arc<dyn Session>) -> Self {
        Self { registry, session }
    }

    /// Handle messages one at a time, in arrival order, until the channel closes.
    pub async fn run(self, mut inbox: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbox.recv().await {
            if let Err(skip) = self.handle(message).await {
                debug!(reason = ?skip, "Message not dispatched");
            }
        }
        info!("Router stopped");
    }

    /// Dispatch one message. Plugin failures are logged, never returned.
    pub async fn handle(&self, message: InboundMessage) -> Result<(), Skip> {
        let text = accept(&message)?;
        info!(
            origin = %message.origin,
            sender = %message.sender,
            attachment = message.has_attachment(),
            body = %truncate(&text, 200),
            "Incoming message"
        );

        let (verb, args) = split_command(&text);
        if !verb.starts_with('/') {
            return Err(Skip::NotACommand);
        }
        let Some(entry) = self.registry.entry_by_command(verb).await else {
            return Err(Skip::UnknownCommand);
        };
        let plugin_id = entry.spec.id.clone();
        if !entry.spec.enabled {
            info!(plugin = %plugin_id, "Plugin disabled");
            return Err(Skip::Disabled);
        }

        let args = args.to_owned();
        let ctx = PluginContext {
            session: Arc::clone(&self.session),
            trigger: normalize_cmd(verb),
            text: Arc::from(text),
            message: Arc::new(message),
            registry: Arc::clone(&self.registry),
        };
        info!(plugin = %plugin_id, args = %truncate(&args, 200), "Dispatching command");
        if let Err(e) = entry.plugin.run(&ctx, &args, &entry.spec).await {
            warn!(error = %e, plugin = %plugin_id, "Plugin failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;
    use bot_core::{MediaInfo, MessagePart, Plugin, PluginSpec, testing::RecordingSession};

    #[derive(Default)]
    struct Probe {
        calls: AtomicUsize,
        args: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Plugin for Probe {
        fn id(&self) -> &'static str {
            "probe"
        }
        fn help(&self) -> &'static str {
            "records calls"
        }
        fn spec(&self) -> PluginSpec {
            PluginSpec::new("probe", &["/probe"])
        }
        async fn run(&self, _ctx: &PluginContext, args: &str, _spec: &PluginSpec) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.args.lock().unwrap().push(args.to_owned());
            anyhow::bail!("plugin errors stay inside the router")
        }
    }

    async fn router(enabled: bool) -> (CommandRouter, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let registry = PluginRegistry::new();
        let mut spec = probe.spec();
        spec.enabled = enabled;
        registry.register(spec, Arc::clone(&probe) as Arc<dyn Plugin>).await;
        let session: Arc<dyn Session> = Arc::new(RecordingSession::new());
        (CommandRouter::new(Arc::new(registry), session), probe)
    }

    fn text(body: &str) -> InboundMessage {
        InboundMessage::text("m1", "111@s.whatsapp.net", body)
    }

    #[tokio::test]
    async fn command_is_dispatched_with_args() {
        let (router, probe) = router(true).await;
        router.handle(text("/PROBE  a  b")).await.unwrap();

        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(probe.args.lock().unwrap()[0], "a  b");
    }

    #[tokio::test]
    async fn own_messages_are_dropped() {
        let (router, probe) = router(true).await;
        let mut message = text("/probe");
        message.from_me = true;
        assert_eq!(router.handle(message).await, Err(Skip::FromSelf));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn group_creation_stub_is_dropped() {
        let (router, probe) = router(true).await;
        let mut message = text("/probe");
        message.stub = Some(StubType::GroupCreate);
        assert_eq!(router.handle(message).await, Err(Skip::GroupCreate));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn textless_message_is_dropped() {
        let (router, _) = router(true).await;
        let mut message = text("");
        message.parts = vec![MessagePart::ContextInfo, MessagePart::Sticker(MediaInfo::default())];
        assert_eq!(router.handle(message).await, Err(Skip::NoText));
    }

    #[tokio::test]
    async fn caption_can_carry_the_command() {
        let (router, probe) = router(true).await;
        let mut message = text("");
        message.parts = vec![MessagePart::Image(MediaInfo {
            caption: Some("/probe look".to_owned()),
            mimetype: Some("image/jpeg".to_owned()),
            ..MediaInfo::default()
        })];
        router.handle(message).await.unwrap();
        assert_eq!(probe.args.lock().unwrap()[0], "look");
    }

    #[tokio::test]
    async fn plain_chat_and_unknown_commands_are_ignored() {
        let (router, _) = router(true).await;
        assert_eq!(router.handle(text("probe")).await, Err(Skip::NotACommand));
        assert_eq!(router.handle(text("/nope")).await, Err(Skip::UnknownCommand));
    }

    #[tokio::test]
    async fn disabled_plugin_is_not_run() {
        let (router, probe) = router(false).await;
        assert_eq!(router.handle(text("/probe")).await, Err(Skip::Disabled));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_drains_in_order() {
        let (router, probe) = router(true).await;
        let (tx, rx) = mpsc::channel(4);
        tx.send(text("/probe 1")).await.unwrap();
        tx.send(text("/probe 2")).await.unwrap();
        drop(tx);
        router.run(rx).await;
        assert_eq!(*probe.args.lock().unwrap(), vec!["1", "2"]);
    }
}
