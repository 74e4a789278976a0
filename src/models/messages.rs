use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse MIME category derived from the attachment file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attachment_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

impl AttachmentKind {
    pub fn from_file_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "svg" => AttachmentKind::Image,
            "mp4" | "webm" | "mov" | "avi" | "mkv" => AttachmentKind::Video,
            "mp3" | "wav" | "ogg" | "m4a" | "flac" => AttachmentKind::Audio,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "txt" | "csv" => {
                AttachmentKind::Document
            }
            _ => AttachmentKind::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub attachment_name: Option<String>,
    pub attachment_size: Option<i64>,
    pub attachment_kind: Option<AttachmentKind>,
    pub created_at: DateTime<Utc>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

/// A message joined with its sender's username, the shape history replay
/// and the REST snapshot serve.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageWithSender {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub message: ChatMessage,
    pub sender_name: String,
}

/// Trims the raw body; blank and whitespace-only input yields `None`.
pub fn normalize_body(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_bodies_are_rejected() {
        assert_eq!(normalize_body(""), None);
        assert_eq!(normalize_body("   \t\n  "), None);
        assert_eq!(normalize_body("  hello  "), Some("hello".to_string()));
    }

    #[test]
    fn attachment_kind_derivation() {
        assert_eq!(
            AttachmentKind::from_file_name("pitch_deck.PDF"),
            AttachmentKind::Document
        );
        assert_eq!(
            AttachmentKind::from_file_name("photo.jpeg"),
            AttachmentKind::Image
        );
        assert_eq!(
            AttachmentKind::from_file_name("demo.mp4"),
            AttachmentKind::Video
        );
        assert_eq!(
            AttachmentKind::from_file_name("note.m4a"),
            AttachmentKind::Audio
        );
        assert_eq!(
            AttachmentKind::from_file_name("archive.zip"),
            AttachmentKind::Other
        );
        assert_eq!(
            AttachmentKind::from_file_name("no_extension"),
            AttachmentKind::Other
        );
    }
}
