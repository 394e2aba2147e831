use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use bot_core::Credentials;

const CREDS_FILE: &str = "creds.json";

/// Credential material under the auth directory, rewritten on every update.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(auth_dir: impl AsRef<Path>) -> Self {
        Self {
            path: auth_dir.as_ref().join(CREDS_FILE),
        }
    }

    /// Stored credentials, or empty ones when nothing was saved yet.
    pub fn load(&self) -> Result<Credentials> {
        if !self.path.exists() {
            return Ok(Credentials::default());
        }
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("reading credentials at {}", self.path.display()))?;
        serde_json::from_str(&data).context("parsing credentials JSON")
    }

    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating auth directory {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(credentials)?;
        fs::write(&self.path, data)
            .with_context(|| format!("writing credentials at {}", self.path.display()))?;
        Ok(())
    }
}
