//! Persist inbound attachments and wrap stored files for outbound relay.
//!
//! Files land under `<root>/<mime category>/<sender>-<timestamp>-wa<id>.<ext>`
//! and are never rewritten or cleaned up.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, anyhow};
use bot_core::{
    InboundMessage, MediaKind, MediaPayload, OutboundPayload, PayloadKind, Session, address,
};
use mime::Mime;
use tokio::fs;
use tracing::{info, warn};

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "flv", "wmv", "3gp", "webm", "mpg", "mpeg", "m4v", "vob", "m2ts",
    "mts",
];
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "svg", "eps", "raw", "cr2", "nef",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "wma"];

/// A stored attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub title: Option<String>,
    pub gif_playback: bool,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn classify(message: &InboundMessage) -> Option<MediaKind> {
        message.attachment().map(|(kind, _)| kind)
    }

    /// Where the attachment of `message` is stored.
    pub fn destination(&self, message: &InboundMessage) -> Result<PathBuf> {
        let (kind, info) = message
            .attachment()
            .ok_or_else(|| anyhow!("message carries no attachment"))?;
        let raw_mime = info
            .mimetype
            .as_deref()
            .ok_or_else(|| anyhow!("attachment has no mimetype"))?;
        let parsed: Mime = raw_mime
            .trim()
            .parse()
            .with_context(|| format!("invalid mimetype {raw_mime:?}"))?;
        let category = sanitize_component(parsed.type_().as_str());
        let subtype = parsed.subtype().as_str().to_owned();

        let from_title = info
            .title
            .as_deref()
            .and_then(|title| title.rsplit('.').next())
            .map(sanitize_extension)
            .filter(|ext| !ext.is_empty());
        let extension = if kind.uses_mime_extension() {
            sanitize_extension(&subtype)
        } else {
            from_title.unwrap_or_else(|| sanitize_extension(&subtype))
        };

        let sender = sanitize_component(address::user_part(&message.sender));
        let id = sanitize_component(&message.id);
        if category.is_empty() || sender.is_empty() || id.is_empty() {
            return Err(anyhow!("message {:?} has no usable file name parts", message.id));
        }
        let timestamp = info.media_key_timestamp.unwrap_or_default();
        let file_name = format!("{sender}-{timestamp}-wa{id}.{extension}");
        Ok(self.root.join(category).join(file_name))
    }

    /// Download and persist the attachment. Failures are logged and yield `None`.
    pub async fn save(&self, session: &dyn Session, message: &InboundMessage) -> Option<MediaFile> {
        match self.try_save(session, message).await {
            Ok(file) => {
                info!(path = %file.path.display(), kind = file.kind.as_str(), bytes = file.len, "Saved media file");
                Some(file)
            }
            Err(e) => {
                warn!(error = %e, message_id = %message.id, "Failed to save media file");
                None
            }
        }
    }

    async fn try_save(&self, session: &dyn Session, message: &InboundMessage) -> Result<MediaFile> {
        let (kind, info) = message
            .attachment()
            .ok_or_else(|| anyhow!("message carries no attachment"))?;
        let path = self.destination(message)?;
        let bytes = session
            .fetch_media_bytes(message)
            .await
            .context("downloading media")?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        fs::write(&path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        Ok(MediaFile {
            path,
            kind,
            title: info.title.clone().filter(|t| !t.is_empty()),
            gif_playback: info.gif_playback,
            len: bytes.len() as u64,
        })
    }

    pub async fn load(path: &Path) -> Result<Vec<u8>> {
        fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }

    /// Relay a stored file. Best effort: failures are logged and reported as `false`.
    pub async fn send(
        session: &dyn Session,
        to: &str,
        file: &Path,
        caption: &str,
        title: Option<&str>,
        gif_playback: bool,
    ) -> bool {
        let payload = match Self::payload(file, caption, title, gif_playback).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, path = %file.display(), "Failed to prepare media relay");
                return false;
            }
        };
        let kind = payload.kind;
        match session.send(to, OutboundPayload::Media(payload)).await {
            Ok(()) => {
                info!(to = %to, kind = kind.as_str(), path = %file.display(), "Relayed media file");
                true
            }
            Err(e) => {
                warn!(error = %e, to = %to, path = %file.display(), "Failed to send media file");
                false
            }
        }
    }

    async fn payload(
        file: &Path,
        caption: &str,
        title: Option<&str>,
        gif_playback: bool,
    ) -> Result<MediaPayload> {
        let bytes = Self::load(file).await?;
        Ok(MediaPayload {
            kind: classify_by_extension(file),
            bytes,
            mimetype: mimetype_for(file),
            caption: Some(caption.to_owned()).filter(|c| !c.is_empty()),
            file_name: title.filter(|t| !t.is_empty()).map(ToOwned::to_owned),
            gif_playback,
        })
    }
}

#[must_use]
pub fn classify_by_extension(path: &Path) -> PayloadKind {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let ext = ext.as_str();
    if VIDEO_EXTENSIONS.contains(&ext) {
        PayloadKind::Video
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        PayloadKind::Image
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        PayloadKind::Audio
    } else {
        PayloadKind::Document
    }
}

#[must_use]
pub fn mimetype_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}

fn sanitize_extension(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Network-supplied path pieces keep only `[A-Za-z0-9_-]`.
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect()
}
