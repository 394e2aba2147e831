use serde::{Deserialize, Serialize};

/// System-event marker carried by a message instead of user content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StubType {
    GroupCreate,
    Other(u32),
}

/// Attachment-specific fields shared by every media variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Original file name, only set for documents.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub gif_playback: bool,
    #[serde(default)]
    pub media_key_timestamp: Option<i64>,
    /// Opaque reference the transport resolves when fetching bytes.
    #[serde(default)]
    pub handle: Option<String>,
}

/// One key of the transport's payload map, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePart {
    ContextInfo,
    Conversation(String),
    ExtendedText(String),
    Image(MediaInfo),
    Video(MediaInfo),
    Audio(MediaInfo),
    Ptt(MediaInfo),
    Sticker(MediaInfo),
    Document(MediaInfo),
    DocumentWithCaption(MediaInfo),
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Ptt,
    Sticker,
    Document,
    DocumentWithCaption,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Ptt => "ptt",
            Self::Sticker => "sticker",
            Self::Document => "document",
            Self::DocumentWithCaption => "document-with-caption",
        }
    }

    /// Kinds whose file extension is the mime subtype rather than the title suffix.
    #[must_use]
    pub const fn uses_mime_extension(self) -> bool {
        match self {
            Self::Image | Self::Sticker | Self::Video => true,
            Self::Audio | Self::Ptt | Self::Document | Self::DocumentWithCaption => false,
        }
    }
}

impl MessagePart {
    #[must_use]
    pub const fn media(&self) -> Option<(MediaKind, &MediaInfo)> {
        match self {
            Self::Image(info) => Some((MediaKind::Image, info)),
            Self::Video(info) => Some((MediaKind::Video, info)),
            Self::Audio(info) => Some((MediaKind::Audio, info)),
            Self::Ptt(info) => Some((MediaKind::Ptt, info)),
            Self::Sticker(info) => Some((MediaKind::Sticker, info)),
            Self::Document(info) => Some((MediaKind::Document, info)),
            Self::DocumentWithCaption(info) => Some((MediaKind::DocumentWithCaption, info)),
            Self::ContextInfo
            | Self::Conversation(_)
            | Self::ExtendedText(_)
            | Self::Unsupported(_) => None,
        }
    }
}

/// Normalized view of one received message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Chat the message arrived in: the sender for direct chats, the group otherwise.
    pub origin: String,
    /// Author of the message (equal to `origin` in direct chats).
    pub sender: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub stub: Option<StubType>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl InboundMessage {
    /// Plain text message from `sender` in a direct chat.
    pub fn text(id: impl Into<String>, sender: impl Into<String>, body: impl Into<String>) -> Self {
        let sender = sender.into();
        Self {
            id: id.into(),
            origin: sender.clone(),
            sender,
            from_me: false,
            stub: None,
            parts: vec![MessagePart::Conversation(body.into())],
        }
    }

    /// The first payload key that is not the context-info marker.
    #[must_use]
    pub fn primary_part(&self) -> Option<&MessagePart> {
        self.parts
            .iter()
            .find(|part| !matches!(part, MessagePart::ContextInfo))
    }

    /// Media kind and fields of the attachment, if the primary part is one.
    #[must_use]
    pub fn attachment(&self) -> Option<(MediaKind, &MediaInfo)> {
        self.primary_part().and_then(MessagePart::media)
    }

    #[must_use]
    pub fn has_attachment(&self) -> bool {
        self.attachment().is_some()
    }

    /// Extract the usable text: plain body, rich-text body, document-wrapper
    /// caption, then the attachment caption. Blank candidates are skipped.
    #[must_use]
    pub fn extract_text(&self) -> Option<String> {
        let conversation = self.parts.iter().find_map(|part| {
            if let MessagePart::Conversation(text) = part {
                Some(text.as_str())
            } else {
                None
            }
        });
        let extended = self.parts.iter().find_map(|part| {
            if let MessagePart::ExtendedText(text) = part {
                Some(text.as_str())
            } else {
                None
            }
        });
        let wrapped_caption = self.parts.iter().find_map(|part| {
            if let MessagePart::DocumentWithCaption(info) = part {
                info.caption.as_deref()
            } else {
                None
            }
        });
        let attachment_caption = self.attachment().and_then(|(_, info)| info.caption.as_deref());

        [conversation, extended, wrapped_caption, attachment_caption]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|candidate| !candidate.is_empty())
            .map(ToOwned::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(parts: Vec<MessagePart>) -> InboundMessage {
        InboundMessage {
            id: "ABC".to_owned(),
            origin: "549111@s.whatsapp.net".to_owned(),
            sender: "549111@s.whatsapp.net".to_owned(),
            from_me: false,
            stub: None,
            parts,
        }
    }

    #[test]
    fn conversation_wins_over_captions() {
        let msg = base(vec![
            MessagePart::Conversation("  /help ".to_owned()),
            MessagePart::ExtendedText("rich".to_owned()),
        ]);
        assert_eq!(msg.extract_text().as_deref(), Some("/help"));
    }

    #[test]
    fn blank_conversation_falls_through_to_extended_text() {
        let msg = base(vec![
            MessagePart::Conversation("   ".to_owned()),
            MessagePart::ExtendedText("/dolar".to_owned()),
        ]);
        assert_eq!(msg.extract_text().as_deref(), Some("/dolar"));
    }

    #[test]
    fn document_wrapper_caption_is_used() {
        let msg = base(vec![
            MessagePart::ContextInfo,
            MessagePart::DocumentWithCaption(MediaInfo {
                caption: Some("/jaula look".to_owned()),
                title: Some("report.pdf".to_owned()),
                ..MediaInfo::default()
            }),
        ]);
        assert_eq!(msg.extract_text().as_deref(), Some("/jaula look"));
        assert_eq!(
            msg.attachment().map(|(kind, _)| kind),
            Some(MediaKind::DocumentWithCaption)
        );
    }

    #[test]
    fn image_caption_is_last_resort() {
        let msg = base(vec![MessagePart::Image(MediaInfo {
            caption: Some("/to joa hi".to_owned()),
            ..MediaInfo::default()
        })]);
        assert_eq!(msg.extract_text().as_deref(), Some("/to joa hi"));
    }

    #[test]
    fn media_without_caption_has_no_text() {
        let msg = base(vec![MessagePart::Sticker(MediaInfo::default())]);
        assert!(msg.extract_text().is_none());
        assert!(msg.has_attachment());
    }

    #[test]
    fn context_info_is_skipped_for_classification() {
        let msg = base(vec![
            MessagePart::ContextInfo,
            MessagePart::Video(MediaInfo::default()),
        ]);
        assert_eq!(msg.attachment().map(|(kind, _)| kind), Some(MediaKind::Video));

        let text_only = base(vec![
            MessagePart::ContextInfo,
            MessagePart::Conversation("hi".to_owned()),
        ]);
        assert!(text_only.attachment().is_none());
    }
}
