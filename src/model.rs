use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a user inside a dialog. Casting-created dialogs pre-assign the
/// casting owner as `Owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Owner,
    Member,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Owner => "owner",
            ParticipantRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(ParticipantRole::Owner),
            "member" => Some(ParticipantRole::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            _ => None,
        }
    }
}

/// Discriminant of [`MessageBody`], used for filtering queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::File => "file",
            MessageKind::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "video" => Some(MessageKind::Video),
            "file" => Some(MessageKind::File),
            "system" => Some(MessageKind::System),
            _ => None,
        }
    }

    /// Media kinds carry attachment references.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            MessageKind::Image | MessageKind::Video | MessageKind::File
        )
    }
}

/// Message payload as a tagged variant. Text carries content, media variants
/// carry opaque attachment ids resolved through the upload service, system
/// messages carry a structured event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text {
        content: String,
    },
    Image {
        attachments: Vec<Uuid>,
        caption: Option<String>,
    },
    Video {
        attachments: Vec<Uuid>,
        caption: Option<String>,
    },
    File {
        attachments: Vec<Uuid>,
        caption: Option<String>,
    },
    System {
        event: serde_json::Value,
    },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text { .. } => MessageKind::Text,
            MessageBody::Image { .. } => MessageKind::Image,
            MessageBody::Video { .. } => MessageKind::Video,
            MessageBody::File { .. } => MessageKind::File,
            MessageBody::System { .. } => MessageKind::System,
        }
    }

    pub fn attachment_ids(&self) -> &[Uuid] {
        match self {
            MessageBody::Image { attachments, .. }
            | MessageBody::Video { attachments, .. }
            | MessageBody::File { attachments, .. } => attachments,
            _ => &[],
        }
    }
}

/// Explicit soft-delete state instead of a nullable timestamp scattered
/// across queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Deletion {
    Active,
    Deleted { at: DateTime<Utc> },
}

impl Deletion {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Deletion::Deleted { .. })
    }

    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => Deletion::Deleted { at },
            None => Deletion::Active,
        }
    }
}

/// A conversation thread, 1:1 or group, optionally bound to a casting.
/// At most one dialog exists per casting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialog {
    pub id: Uuid,
    pub is_group: bool,
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub casting_id: Option<Uuid>,
    /// Most recently created non-deleted message in this dialog.
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's membership record in a dialog. Leaving is soft: `left_at` is set
/// and the row is never deleted, so message history stays attributable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub dialog_id: Uuid,
    pub user_id: Uuid,
    pub role: ParticipantRole,
    pub is_muted: bool,
    pub typing_until: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub dialog_id: Uuid,
    pub sender_id: Uuid,
    #[serde(flatten)]
    pub body: MessageBody,
    pub reply_to_id: Option<Uuid>,
    pub forward_from_id: Option<Uuid>,
    pub status: MessageStatus,
    #[serde(flatten)]
    pub deletion: Deletion,
    pub created_at: DateTime<Utc>,
}

/// A single emoji a user has attached to a message; at most one per user per
/// message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only record that a user has read a message. Existence of the row
/// is the sole read signal; receipts are never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// Fully hydrated dialog aggregate, assembled deliberately by the store so
/// loading cost is explicit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogView {
    pub dialog: Dialog,
    pub participants: Vec<Participant>,
    pub last_message: Option<Message>,
}

impl DialogView {
    pub fn id(&self) -> Uuid {
        self.dialog.id
    }

    pub fn active_participant_ids(&self) -> Vec<Uuid> {
        self.participants
            .iter()
            .filter(|p| p.is_active())
            .map(|p| p.user_id)
            .collect()
    }
}
