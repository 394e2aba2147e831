use std::{
    collections::HashMap,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use serde::Deserialize;

use bot_core::{
    PluginSpec,
    address::{self, AddressKind},
};
use price_watch::PriceWatchConfig;

#[derive(Parser, Debug)]
#[command(
    name = "relay-bot",
    version,
    about = "Personal messaging relay bot with a dollar quote watcher"
)]
pub struct Args {
    /// Path to the YAML config (operator, aliases, price feed, plugins)
    #[arg(long, env = "RELAY_CONFIG", default_value = "./config.yaml")]
    pub config: PathBuf,

    /// Directory holding the persisted session credentials
    #[arg(long, env = "RELAY_AUTH_DIR", default_value = "./auth_info")]
    pub auth_dir: PathBuf,

    /// Root directory for stored attachments
    #[arg(long, env = "RELAY_UPLOADS_DIR", default_value = "./uploads")]
    pub uploads_dir: PathBuf,

    /// Listen address of the pairing QR endpoint
    #[arg(long, env = "RELAY_HTTP_ADDR", default_value = "0.0.0.0:3000")]
    pub http_addr: SocketAddr,

    /// Directory with per-plugin `<id>/config.yaml` overrides
    #[arg(long, env = "PLUGINS_DIR", default_value = "./plugins")]
    pub plugins_dir: PathBuf,

    /// Number the console transport types as (defaults to the operator)
    #[arg(long, env = "RELAY_CONSOLE_SENDER")]
    pub console_sender: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Operator {
    /// Chat that receives bootstrap and price notifications.
    pub address: String,
    /// Numeric identifier allowed to run `/x`.
    pub id: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KarmaSettings {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub taunts: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub operator: Operator,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    #[serde(default)]
    pub cage_group: Option<String>,
    #[serde(default)]
    pub karma: KarmaSettings,
    #[serde(default)]
    pub price: PriceWatchConfig,
    #[serde(default, alias = "tools")]
    pub plugins: Vec<PluginSpec>,
}

impl BotConfig {
    /// Group addresses the config knows about.
    #[must_use]
    pub fn known_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .cage_group
            .iter()
            .chain(self.aliases.values())
            .filter(|a| address::kind_of(a) == AddressKind::Group)
            .cloned()
            .collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }
}

pub fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "config file not found at {}. Create one or set --config",
            path.display()
        ));
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    parse_config(&yaml)
}

pub fn parse_config(yaml: &str) -> Result<BotConfig> {
    let cfg: BotConfig = serde_yaml::from_str(yaml).context("parsing YAML config")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
operator:
  address: "5493510000000@s.whatsapp.net"
  id: "5493510000000"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.operator.id, "5493510000000");
        assert!(cfg.aliases.is_empty());
        assert_eq!(cfg.price.interval_secs, 60);
        assert_eq!(cfg.price.utc_offset_hours, -3);
        assert_eq!(cfg.price.anchors.section, "BluePromedio");
        assert!(cfg.plugins.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let yaml = format!(
            r#"{MINIMAL}
aliases:
  mom: "5493511111111@s.whatsapp.net"
  friends: "120363111@g.us"
cage_group: "120363222@g.us"
karma:
  target: "5493512222222@s.whatsapp.net"
  taunts: ["a", "b"]
price:
  label: "MENDOZA"
  interval_secs: 300
plugins:
  - id: exec
    enabled: false
"#
        );
        let cfg = parse_config(&yaml).unwrap();
        assert_eq!(cfg.karma.taunts.len(), 2);
        assert_eq!(cfg.price.label, "MENDOZA");
        assert_eq!(cfg.price.interval_secs, 300);
        assert!(!cfg.plugins[0].enabled);
        assert_eq!(cfg.known_groups(), vec!["120363111@g.us", "120363222@g.us"]);
    }

    #[test]
    fn missing_operator_is_rejected() {
        assert!(parse_config("aliases: {}").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_config(&tmp.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn cli_defaults() {
        let args = Args::try_parse_from(["relay-bot"]).unwrap();
        assert_eq!(args.auth_dir, PathBuf::from("./auth_info"));
        assert_eq!(args.http_addr.port(), 3000);
    }
}
