use thiserror::Error;

/// Failures at the session boundary.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no active session")]
    NoActiveSession,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("media error: {0}")]
    Media(String),
}

impl SessionError {
    pub fn transport(err: impl core::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}
