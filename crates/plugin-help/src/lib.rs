use core::fmt::Write as _;
use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;

use bot_core::{Plugin, PluginContext, PluginRegistry, PluginSpec, reply};

#[derive(Debug)]
pub struct Help;

/// Command reference built from whatever is registered and enabled.
pub async fn render(registry: &PluginRegistry) -> String {
    let mut lines: Vec<(String, &'static str)> = Vec::new();
    let mut aliases = BTreeSet::new();
    for (_, entry) in registry.entries().await {
        if !entry.spec.enabled {
            continue;
        }
        if let Some(map) = entry.spec.config.get("aliases").and_then(|v| v.as_mapping()) {
            aliases.extend(map.keys().filter_map(|k| k.as_str()).map(ToOwned::to_owned));
        }
        let help = entry.plugin.help();
        for cmd in &entry.spec.triggers.commands {
            lines.push((bot_core::normalize_cmd(cmd), help));
        }
    }
    lines.sort_unstable();

    let mut out = String::from("*Commands*\n");
    for (cmd, help) in &lines {
        let _ = writeln!(out, "{cmd} - {help}");
    }
    if !aliases.is_empty() {
        let names: Vec<String> = aliases.into_iter().collect();
        let _ = write!(out, "\n*Aliases:* {}\n", names.join(", "));
    }
    out.push_str("\n_Commands also work as the caption of an image, video or document._");
    out
}

#[async_trait]
impl Plugin for Help {
    fn id(&self) -> &'static str {
        "help"
    }

    fn help(&self) -> &'static str {
        "Show this command reference"
    }

    fn spec(&self) -> PluginSpec {
        PluginSpec::new("help", &["/help"])
    }

    async fn run(&self, ctx: &PluginContext, _args: &str, _spec: &PluginSpec) -> Result<()> {
        reply(ctx, render(&ctx.registry).await).await
    }
}
