//! Dialog Store: persistence contracts over dialogs, participants, messages,
//! reactions and read receipts.
//!
//! Pure data operations, no authorization. Each compound operation is one
//! transaction inside the implementation, so callers compose operations
//! without holding transaction handles (see DESIGN.md on the transaction
//! boundary decision).

mod postgres;

pub use postgres::PgDialogStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::model::{
    DialogView, Message, MessageBody, MessageKind, ParticipantRole, Reaction,
};

/// Input for dialog creation. Participants are inserted separately through
/// [`DialogStore::add_participants`].
#[derive(Debug, Clone)]
pub struct NewDialog {
    pub is_group: bool,
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub casting_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub dialog_id: Uuid,
    pub user_id: Uuid,
    pub role: ParticipantRole,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub dialog_id: Uuid,
    pub sender_id: Uuid,
    pub body: MessageBody,
    pub reply_to_id: Option<Uuid>,
    pub forward_from_id: Option<Uuid>,
}

/// Cursor and filters for message pagination.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageQuery {
    /// Return messages strictly older than this message.
    pub before_id: Option<Uuid>,
    /// Return messages strictly newer than this message.
    pub after_id: Option<Uuid>,
    pub kind: Option<MessageKind>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl MessageQuery {
    /// Effective page size: default when unset, hard-capped.
    pub fn effective_limit(&self, default_size: u32, max_size: u32) -> u32 {
        self.limit.unwrap_or(default_size).min(max_size).max(1)
    }
}

/// One page of messages, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Count of all non-deleted messages matching the filters, ignoring the
    /// pagination cursor.
    pub total: i64,
    pub has_more: bool,
}

/// Outcome of a reaction toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionChange {
    Added,
    Replaced,
    Removed,
}

/// Narrow seam the Connection Hub uses to resolve a dialog's currently
/// active participants; implemented by every store.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn active_participant_ids(&self, dialog_id: Uuid) -> AppResult<Vec<Uuid>>;
}

#[async_trait]
pub trait DialogStore: ParticipantDirectory + Send + Sync {
    /// Fails with Conflict when a dialog for the same casting already exists.
    async fn create_dialog(&self, dialog: NewDialog) -> AppResult<Uuid>;

    /// Hydrated dialog with participants and last message; NotFound if absent.
    async fn find_dialog(&self, dialog_id: Uuid) -> AppResult<DialogView>;

    async fn find_dialog_by_casting(&self, casting_id: Uuid) -> AppResult<DialogView>;

    /// Dialogs where the user is an active participant, most recently
    /// updated first.
    async fn find_dialogs_for_user(&self, user_id: Uuid) -> AppResult<Vec<DialogView>>;

    /// The unique active 1:1 dialog between two users; NotFound otherwise.
    async fn find_dialog_between_users(&self, a: Uuid, b: Uuid) -> AppResult<DialogView>;

    /// Bulk insert; no-op on empty input.
    async fn add_participants(&self, batch: Vec<NewParticipant>) -> AppResult<()>;

    /// True only while a participant row exists with `left_at IS NULL`.
    async fn is_user_in_dialog(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<bool>;

    /// Soft leave: sets `left_at`, never deletes the row.
    async fn leave_dialog(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<()>;

    async fn set_typing(
        &self,
        dialog_id: Uuid,
        user_id: Uuid,
        until: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Inserts the message and updates the owning dialog's `last_message_id`
    /// and `updated_at` in the same transaction.
    async fn create_message(&self, message: NewMessage) -> AppResult<Message>;

    async fn find_message(&self, message_id: Uuid) -> AppResult<Message>;

    /// Cursor pagination over non-deleted messages, newest first.
    async fn find_messages(&self, dialog_id: Uuid, query: MessageQuery)
        -> AppResult<MessagePage>;

    /// Non-deleted media messages of a dialog, optionally filtered by kind.
    async fn find_attachment_messages(
        &self,
        dialog_id: Uuid,
        kind: Option<MessageKind>,
    ) -> AppResult<Vec<Message>>;

    /// Inserts one receipt per unread message authored by someone else and
    /// flips those messages to `read`, atomically. Re-invocation creates no
    /// duplicates. Returns the ids of messages that became read.
    async fn mark_messages_read(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Messages authored by others with no read receipt for `user_id`,
    /// excluding soft-deleted ones. Single COUNT query.
    async fn unread_count(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<i64>;

    /// One active emoji per user per message: a second identical toggle
    /// removes it, a different emoji replaces it.
    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> AppResult<ReactionChange>;

    async fn remove_reaction(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()>;

    async fn reactions_for_message(&self, message_id: Uuid) -> AppResult<Vec<Reaction>>;

    /// Soft delete; dependent reactions and receipts are retained. Repoints
    /// the dialog's `last_message_id` when the deleted message was the last.
    async fn delete_message(&self, message_id: Uuid) -> AppResult<()>;

    /// Soft-deletes every message a user authored in a dialog.
    async fn delete_user_messages(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<u64>;

    /// Hard delete, cascading receipts, reactions, messages, participants,
    /// then the dialog itself, in that foreign-key order.
    async fn delete_dialog(&self, dialog_id: Uuid) -> AppResult<()>;
}
