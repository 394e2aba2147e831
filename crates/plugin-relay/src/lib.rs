//! Anonymous relays: `/to <destination> <text>` and `/jaula <text>`.
//!
//! Both forward either the remaining text or the attachment of the triggering
//! message. The destination is validated before anything is sent.

mod destination;
mod relay_config;

pub use destination::{GROUP_LOOKUP_TIMEOUT, is_valid};
pub use relay_config::RelayConfig;

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use bot_core::{Plugin, PluginContext, PluginSpec, reply, send_text_to};
use media_store::MediaStore;
use tracing::{info, warn};

pub const INVALID_DESTINATION: &str = "*ERROR:*\nThe destination is not valid.";
pub const NOTHING_TO_RELAY: &str = "Nothing to relay: add a text or attach a file.";

/// Header placed above relayed content.
#[derive(Debug, Clone, Copy)]
struct Framing {
    text: &'static str,
    media: &'static str,
}

const ANONYMOUS: Framing = Framing {
    text: "*Anonymous message for you:*",
    media: "*Anonymous message for you:*",
};

const RUMOR: Framing = Framing {
    text: "_A rumor reached me (:_",
    media: "_A little bird sent me this (:_",
};

fn framed(header: &str, body: &str) -> String {
    if body.is_empty() {
        header.to_owned()
    } else {
        format!("{header}\n{body}")
    }
}

/// Split `<destination> <rest>`; inner spacing of the rest is preserved.
#[must_use]
pub fn split_destination(args: &str) -> Option<(&str, &str)> {
    let args = args.trim_start();
    if args.is_empty() {
        return None;
    }
    Some(
        args.split_once(char::is_whitespace)
            .map_or((args, ""), |(dest, rest)| (dest, rest.trim_start())),
    )
}

/// Validate, then forward the attachment (if any) or the text to `to`.
async fn relay(
    ctx: &PluginContext,
    store: &MediaStore,
    to: &str,
    body: &str,
    framing: Framing,
) -> Result<()> {
    let session = ctx.session.as_ref();
    if !is_valid(session, to).await {
        info!(to, trigger = %ctx.trigger, "Rejected relay to invalid destination");
        return reply(ctx, INVALID_DESTINATION).await;
    }

    if ctx.message.has_attachment() {
        let Some(file) = store.save(session, &ctx.message).await else {
            warn!(message_id = %ctx.message.id, "Attachment could not be stored; relay skipped");
            return Ok(());
        };
        let caption = framed(framing.media, body);
        MediaStore::send(
            session,
            to,
            &file.path,
            &caption,
            file.title.as_deref(),
            file.gif_playback,
        )
        .await;
        return Ok(());
    }

    let body = body.trim();
    if body.is_empty() {
        return reply(ctx, NOTHING_TO_RELAY).await;
    }
    send_text_to(session, to, framed(framing.text, body)).await?;
    info!(to, trigger = %ctx.trigger, "Relayed text");
    Ok(())
}

/// `/to`: relay to an alias, a bare number or a full address.
#[derive(Debug, Clone)]
pub struct AnonymousRelay {
    store: Arc<MediaStore>,
}

impl AnonymousRelay {
    #[must_use]
    pub const fn new(store: Arc<MediaStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Plugin for AnonymousRelay {
    fn id(&self) -> &'static str {
        "to"
    }

    fn help(&self) -> &'static str {
        "/to <number|alias> <text>: send anonymously (attachments too)"
    }

    fn spec(&self) -> PluginSpec {
        PluginSpec::new("to", &["/to"])
    }

    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()> {
        let Some((token, body)) = split_destination(args) else {
            return reply(ctx, INVALID_DESTINATION).await;
        };
        let to = RelayConfig::from_spec(spec).resolve(token);
        relay(ctx, &self.store, &to, body, ANONYMOUS).await
    }
}

/// `/jaula`: relay to the configured cage group.
#[derive(Debug, Clone)]
pub struct CageRelay {
    store: Arc<MediaStore>,
}

impl CageRelay {
    #[must_use]
    pub const fn new(store: Arc<MediaStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Plugin for CageRelay {
    fn id(&self) -> &'static str {
        "jaula"
    }

    fn help(&self) -> &'static str {
        "/jaula <text>: spread a rumor in the cage group (attachments too)"
    }

    fn spec(&self) -> PluginSpec {
        PluginSpec::new("jaula", &["/jaula"])
    }

    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()> {
        let Some(cage) = RelayConfig::from_spec(spec).cage_group else {
            bail!("cage group is not configured");
        };
        relay(ctx, &self.store, &cage, args.trim_start(), RUMOR).await
    }
}
