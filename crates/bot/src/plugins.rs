use std::{path::Path, sync::Arc};

use bot_core::{Plugin, PluginRegistry, PluginSpec};
use media_store::MediaStore;
use price_watch::PriceBoard;
use serde_yaml::{Mapping, Value};
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::config::BotConfig;

/// Long-lived collaborators some plugins are built around.
#[derive(Debug, Clone)]
pub struct PluginDeps {
    pub store: Arc<MediaStore>,
    pub board: PriceBoard,
    pub tracker: TaskTracker,
}

fn builtin(deps: &PluginDeps) -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(plugin_help::Help),
        Arc::new(plugin_karma::Karma),
        Arc::new(plugin_dolar::Dolar::new(deps.board.clone())),
        Arc::new(plugin_relay::AnonymousRelay::new(Arc::clone(&deps.store))),
        Arc::new(plugin_relay::CageRelay::new(Arc::clone(&deps.store))),
        Arc::new(plugin_exec::Exec::new(deps.tracker.clone())),
    ]
}

/// Config each built-in plugin derives from the top-level bot config.
fn injected_config(config: &BotConfig, id: &str) -> Value {
    let mut map = Mapping::new();
    let mut put = |key: &str, value: Value| {
        map.insert(Value::from(key), value);
    };
    match id {
        "karma" => {
            if let Some(target) = &config.karma.target {
                put("target", Value::from(target.as_str()));
            }
            if let Some(cage) = &config.cage_group {
                put("cage_group", Value::from(cage.as_str()));
            }
            put(
                "taunts",
                Value::Sequence(config.karma.taunts.iter().map(|t| Value::from(t.as_str())).collect()),
            );
        }
        "to" => {
            let aliases = config
                .aliases
                .iter()
                .map(|(name, addr)| (Value::from(name.as_str()), Value::from(addr.as_str())))
                .collect();
            put("aliases", Value::Mapping(aliases));
        }
        "jaula" => {
            if let Some(cage) = &config.cage_group {
                put("cage_group", Value::from(cage.as_str()));
            }
        }
        "exec" => put("operator_id", Value::from(config.operator.id.as_str())),
        _ => {}
    }
    if map.is_empty() {
        Value::Null
    } else {
        Value::Mapping(map)
    }
}

pub async fn build_registry(
    config: &BotConfig,
    deps: &PluginDeps,
    plugins_dir: &Path,
) -> Arc<PluginRegistry> {
    let plugins = builtin(deps);

    let mut specs = config.plugins.clone();
    for p in &plugins {
        merge_default_spec(&mut specs, p.spec());
    }

    let registry = Arc::new(PluginRegistry::new());
    for mut spec in specs {
        let Some(plugin) = plugins.iter().find(|p| p.id() == spec.id) else {
            warn!(plugin = %spec.id, "Unknown plugin ID");
            continue;
        };
        spec.config = merge_yaml(spec.config, injected_config(config, &spec.id));
        if let Some(file_cfg) = load_plugin_config(plugins_dir, &spec.id) {
            spec.config = merge_yaml(file_cfg, spec.config);
        }
        info!(plugin = %spec.id, enabled = spec.enabled, commands = ?spec.triggers.commands, "Registered plugin");
        registry.register(spec, Arc::clone(plugin)).await;
    }
    registry
}

/// Deep merge where `primary` wins on conflicts. Sequences are concatenated.
pub fn merge_yaml(primary: Value, fallback: Value) -> Value {
    match (primary, fallback) {
        (Value::Mapping(mut a), Value::Mapping(b)) => {
            for (k, v_b) in b {
                match a.get_mut(&k) {
                    Some(v_a) => {
                        let merged = merge_yaml(v_a.clone(), v_b);
                        *v_a = merged;
                    }
                    None => {
                        a.insert(k, v_b);
                    }
                }
            }
            Value::Mapping(a)
        }
        (Value::Sequence(mut a), Value::Sequence(b)) => {
            a.extend(b);
            Value::Sequence(a)
        }
        (Value::Null, b) => b,
        (a, _b) => a,
    }
}

fn load_plugin_config(root: &Path, id: &str) -> Option<Value> {
    let path = root.join(id).join("config.yaml");
    match std::fs::read_to_string(&path) {
        Ok(s) => match serde_yaml::from_str::<Value>(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(plugin = %id, file = %path.display(), error = %e, "Failed to parse plugin config YAML");
                None
            }
        },
        Err(e) => {
            if path.exists() {
                warn!(plugin = %id, file = %path.display(), error = %e, "Failed to read plugin config file");
            }
            None
        }
    }
}

/// Add the plugin's default spec, or top up an existing one with its default commands.
fn merge_default_spec(specs: &mut Vec<PluginSpec>, default: PluginSpec) {
    if let Some(existing) = specs.iter_mut().find(|s| s.id == default.id) {
        for cmd in default.triggers.commands {
            if !existing
                .triggers
                .commands
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&cmd))
            {
                existing.triggers.commands.push(cmd);
            }
        }
    } else {
        specs.push(default);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn deps(tmp: &Path) -> PluginDeps {
        PluginDeps {
            store: Arc::new(MediaStore::new(tmp.join("uploads"))),
            board: PriceBoard::new(),
            tracker: TaskTracker::new(),
        }
    }

    const CONFIG: &str = r#"
operator:
  address: "op@s.whatsapp.net"
  id: "5493510000000"
aliases:
  mom: "5493511111111@s.whatsapp.net"
cage_group: "120363@g.us"
karma:
  target: "5493512222222@s.whatsapp.net"
  taunts: ["a"]
plugins:
  - id: karma
    config:
      taunts: ["b"]
  - id: dolar
    enabled: false
    triggers:
      commands: ["/usd"]
  - id: nonexistent
"#;

    #[test]
    fn merge_prefers_primary_and_fills_gaps() {
        let primary: Value = serde_yaml::from_str("a: 1\nnested: {x: 1}\nlist: [1]").unwrap();
        let fallback: Value =
            serde_yaml::from_str("a: 2\nb: 3\nnested: {x: 2, y: 2}\nlist: [2]").unwrap();
        let merged = merge_yaml(primary, fallback);
        let expected: Value =
            serde_yaml::from_str("a: 1\nnested: {x: 1, y: 2}\nlist: [1, 2]\nb: 3").unwrap();
        assert_eq!(merged, expected);
        assert_eq!(merge_yaml(Value::Null, Value::from(5)), Value::from(5));
    }

    #[tokio::test]
    async fn registry_has_every_builtin_and_config_flows_in() {
        let tmp = tempfile::tempdir().unwrap();
        let config = parse_config(CONFIG).unwrap();
        let registry = build_registry(&config, &deps(tmp.path()), tmp.path()).await;

        for cmd in ["/help", "/karma", "/dolar", "/usd", "/to", "/jaula", "/x"] {
            assert!(registry.entry_by_command(cmd).await.is_some(), "{cmd}");
        }
        assert!(registry.entry("nonexistent").await.is_none());
        assert!(!registry.entry("dolar").await.unwrap().spec.enabled);

        let exec = registry.entry("exec").await.unwrap().spec;
        assert_eq!(exec.config["operator_id"], Value::from("5493510000000"));
        let to = registry.entry("to").await.unwrap().spec;
        assert_eq!(to.config["aliases"]["mom"], Value::from("5493511111111@s.whatsapp.net"));
        let jaula = registry.entry("jaula").await.unwrap().spec;
        assert_eq!(jaula.config["cage_group"], Value::from("120363@g.us"));

        let karma = registry.entry("karma").await.unwrap().spec;
        assert_eq!(karma.config["taunts"], serde_yaml::from_str::<Value>("[b, a]").unwrap());
        assert_eq!(karma.config["cage_group"], Value::from("120363@g.us"));
    }

    #[tokio::test]
    async fn plugin_dir_file_overrides_config() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("karma");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), "target: \"file@s.whatsapp.net\"\n").unwrap();

        let config = parse_config(CONFIG).unwrap();
        let registry = build_registry(&config, &deps(tmp.path()), tmp.path()).await;
        let karma = registry.entry("karma").await.unwrap().spec;
        assert_eq!(karma.config["target"], Value::from("file@s.whatsapp.net"));
    }
}
