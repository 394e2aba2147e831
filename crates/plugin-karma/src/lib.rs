use anyhow::{Result, bail};
use async_trait::async_trait;
use rand::seq::SliceRandom as _;
use rand::thread_rng;
use serde::Deserialize;
use tracing::info;

use bot_core::{Plugin, PluginContext, PluginSpec, send_text_to};

/// Used when the config lists no taunts of its own.
pub const DEFAULT_TAUNTS: &[&str] = &[
    "Karma always finds you",
    "You again?",
    "Nobody asked",
    "Try harder",
    "Still waiting for a good idea from you",
    "Bold of you to show up",
    "Legend says you were right once",
    "Not even the bot believes you",
    "Go touch grass",
];

/// Example YAML (an empty or missing `taunts` list means [`DEFAULT_TAUNTS`]):
/// ```yaml
/// target: "5491100000000@s.whatsapp.net"
/// cage_group: "120363000000000000@g.us"
/// taunts:
///   - "Karma always finds you"
/// ```
#[derive(Debug, Default, Deserialize)]
struct KarmaConfig {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    cage_group: Option<String>,
    #[serde(default)]
    taunts: Vec<String>,
}

#[derive(Debug)]
pub struct Karma;

impl Karma {
    fn load_config(spec: &PluginSpec) -> KarmaConfig {
        serde_yaml::from_value::<KarmaConfig>(spec.config.clone()).unwrap_or_default()
    }
}

/// The cage group answers for itself; everywhere else the taunt goes to the target.
fn recipient<'a>(cfg: &'a KarmaConfig, origin: &'a str) -> Option<&'a str> {
    if cfg.cage_group.as_deref() == Some(origin) {
        Some(origin)
    } else {
        cfg.target.as_deref()
    }
}

#[async_trait]
impl Plugin for Karma {
    fn id(&self) -> &'static str {
        "karma"
    }

    fn help(&self) -> &'static str {
        "Send a random taunt to the karma target"
    }

    fn spec(&self) -> PluginSpec {
        PluginSpec::new("karma", &["/karma"])
    }

    async fn run(&self, ctx: &PluginContext, _args: &str, spec: &PluginSpec) -> Result<()> {
        let cfg = Self::load_config(spec);
        let Some(to) = recipient(&cfg, &ctx.message.origin) else {
            bail!("karma target is not configured");
        };

        // ThreadRng is not Send; keep it out of the await below.
        let choice = {
            let mut rng = thread_rng();
            if cfg.taunts.is_empty() {
                DEFAULT_TAUNTS.choose(&mut rng).map(|t| (*t).to_owned())
            } else {
                cfg.taunts.choose(&mut rng).cloned()
            }
        };
        let Some(taunt) = choice else {
            bail!("no taunts available");
        };

        info!(to, "Sending karma");
        send_text_to(ctx.session.as_ref(), to, format!("*{taunt}*")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_core::{
        InboundMessage, PluginRegistry,
        testing::{RecordingSession, context},
    };
    use std::sync::Arc;

    fn spec_with(yaml: &str) -> PluginSpec {
        let mut spec = Karma.spec();
        spec.config = serde_yaml::from_str(yaml).unwrap();
        spec
    }

    fn ctx(session: &Arc<RecordingSession>, origin: &str) -> PluginContext {
        let mut message = InboundMessage::text("m1", "111@s.whatsapp.net", "/karma");
        message.origin = origin.to_owned();
        context(session, message, Arc::new(PluginRegistry::new()))
    }

    const CONFIG: &str = r#"
target: "999@s.whatsapp.net"
cage_group: "cage@g.us"
taunts: ["one", "two", "three"]
"#;

    #[tokio::test]
    async fn taunt_goes_to_target() {
        let session = Arc::new(RecordingSession::new());
        Karma
            .run(&ctx(&session, "111@s.whatsapp.net"), "", &spec_with(CONFIG))
            .await
            .unwrap();

        let sent = session.sent_texts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "999@s.whatsapp.net");
        assert!(["*one*", "*two*", "*three*"].contains(&sent[0].1.as_str()));
    }

    #[tokio::test]
    async fn cage_group_gets_the_taunt_itself() {
        let session = Arc::new(RecordingSession::new());
        Karma
            .run(&ctx(&session, "cage@g.us"), "", &spec_with(CONFIG))
            .await
            .unwrap();

        assert_eq!(session.sent_texts()[0].0, "cage@g.us");
    }

    #[tokio::test]
    async fn missing_target_is_an_error() {
        let session = Arc::new(RecordingSession::new());
        let res = Karma
            .run(&ctx(&session, "x@g.us"), "", &spec_with("taunts: [a]"))
            .await;
        assert!(res.is_err());
        assert!(session.sent().is_empty());
    }

    #[tokio::test]
    async fn empty_taunt_list_falls_back_to_defaults() {
        let session = Arc::new(RecordingSession::new());
        let spec = spec_with("target: \"999@s.whatsapp.net\"\ntaunts: []");
        Karma
            .run(&ctx(&session, "111@s.whatsapp.net"), "", &spec)
            .await
            .unwrap();

        let sent = session.sent_texts();
        assert_eq!(sent.len(), 1);
        let taunt = sent[0].1.trim_matches('*');
        assert!(DEFAULT_TAUNTS.contains(&taunt));
    }
}
