use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use bot_core::{PluginSpec, address};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    /// Short names accepted in place of a full address.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Fixed destination of `/jaula`.
    #[serde(default)]
    pub cage_group: Option<String>,
}

impl RelayConfig {
    pub fn from_spec(spec: &PluginSpec) -> Self {
        serde_yaml::from_value(spec.config.clone()).unwrap_or_default()
    }

    /// Alias lookup first (case-insensitive), else treat the token as a number or address.
    #[must_use]
    pub fn resolve(&self, token: &str) -> String {
        let wanted = token.trim().to_lowercase();
        self.aliases
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map_or_else(|| address::individual(token.trim()), |(_, addr)| addr.clone())
    }
}
