//! Postgres implementation of the Dialog Store.
//!
//! Query contracts only; migrations are owned by the platform repo. Compound
//! operations (message insert + dialog pointer, receipt insert + status flip,
//! dialog cascade) run inside a single transaction each.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{
    Deletion, Dialog, DialogView, Message, MessageBody, MessageKind, MessageStatus, Participant,
    ParticipantRole, Reaction,
};
use crate::store::{
    DialogStore, MessagePage, MessageQuery, NewDialog, NewMessage, NewParticipant,
    ParticipantDirectory, ReactionChange,
};

pub struct PgDialogStore {
    pool: PgPool,
}

impl PgDialogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct DialogRow {
    id: Uuid,
    is_group: bool,
    title: Option<String>,
    image_url: Option<String>,
    casting_id: Option<Uuid>,
    last_message_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DialogRow> for Dialog {
    fn from(row: DialogRow) -> Self {
        Dialog {
            id: row.id,
            is_group: row.is_group,
            title: row.title,
            image_url: row.image_url,
            casting_id: row.casting_id,
            last_message_id: row.last_message_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    dialog_id: Uuid,
    user_id: Uuid,
    role: String,
    is_muted: bool,
    typing_until: Option<DateTime<Utc>>,
    last_seen_at: Option<DateTime<Utc>>,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = AppError;

    fn try_from(row: ParticipantRow) -> Result<Self, AppError> {
        let role = ParticipantRole::parse(&row.role)
            .ok_or_else(|| AppError::internal(format!("unknown participant role '{}'", row.role)))?;
        Ok(Participant {
            dialog_id: row.dialog_id,
            user_id: row.user_id,
            role,
            is_muted: row.is_muted,
            typing_until: row.typing_until,
            last_seen_at: row.last_seen_at,
            joined_at: row.joined_at,
            left_at: row.left_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    dialog_id: Uuid,
    sender_id: Uuid,
    kind: String,
    content: Option<String>,
    attachments: Option<Vec<Uuid>>,
    caption: Option<String>,
    system_event: Option<serde_json::Value>,
    reply_to_id: Option<Uuid>,
    forward_from_id: Option<Uuid>,
    status: String,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self, AppError> {
        let kind = MessageKind::parse(&row.kind)
            .ok_or_else(|| AppError::internal(format!("unknown message kind '{}'", row.kind)))?;
        let status = MessageStatus::parse(&row.status)
            .ok_or_else(|| AppError::internal(format!("unknown message status '{}'", row.status)))?;

        let body = match kind {
            MessageKind::Text => MessageBody::Text {
                content: row.content.unwrap_or_default(),
            },
            MessageKind::Image => MessageBody::Image {
                attachments: row.attachments.unwrap_or_default(),
                caption: row.caption,
            },
            MessageKind::Video => MessageBody::Video {
                attachments: row.attachments.unwrap_or_default(),
                caption: row.caption,
            },
            MessageKind::File => MessageBody::File {
                attachments: row.attachments.unwrap_or_default(),
                caption: row.caption,
            },
            MessageKind::System => MessageBody::System {
                event: row.system_event.unwrap_or(serde_json::Value::Null),
            },
        };

        Ok(Message {
            id: row.id,
            dialog_id: row.dialog_id,
            sender_id: row.sender_id,
            body,
            reply_to_id: row.reply_to_id,
            forward_from_id: row.forward_from_id,
            status,
            deletion: Deletion::from_deleted_at(row.deleted_at),
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReactionRow {
    message_id: Uuid,
    user_id: Uuid,
    emoji: String,
    created_at: DateTime<Utc>,
}

impl From<ReactionRow> for Reaction {
    fn from(row: ReactionRow) -> Self {
        Reaction {
            message_id: row.message_id,
            user_id: row.user_id,
            emoji: row.emoji,
            created_at: row.created_at,
        }
    }
}

const MESSAGE_COLUMNS: &str = "id, dialog_id, sender_id, kind, content, attachments, caption, \
     system_event, reply_to_id, forward_from_id, status, deleted_at, created_at";

// ============================================================================
// Hydration helpers
// ============================================================================

impl PgDialogStore {
    async fn hydrate(&self, dialog: Dialog) -> AppResult<DialogView> {
        let participant_rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT dialog_id, user_id, role, is_muted, typing_until, last_seen_at, joined_at, left_at
            FROM dialog_participants
            WHERE dialog_id = $1
            ORDER BY joined_at
            "#,
        )
        .bind(dialog.id)
        .fetch_all(&self.pool)
        .await?;

        let participants = participant_rows
            .into_iter()
            .map(Participant::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let last_message = match dialog.last_message_id {
            Some(message_id) => {
                let row = sqlx::query_as::<_, MessageRow>(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
                ))
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;
                row.map(Message::try_from).transpose()?
            }
            None => None,
        };

        Ok(DialogView {
            dialog,
            participants,
            last_message,
        })
    }

    async fn fetch_dialog_row(&self, dialog_id: Uuid) -> AppResult<Dialog> {
        let row = sqlx::query_as::<_, DialogRow>(
            r#"
            SELECT id, is_group, title, image_url, casting_id, last_message_id, created_at, updated_at
            FROM dialogs
            WHERE id = $1
            "#,
        )
        .bind(dialog_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("dialog"))?;

        Ok(row.into())
    }

    /// Repoints `last_message_id` at the newest non-deleted message after a
    /// soft delete, keeping the dialog pointer invariant.
    async fn refresh_last_message(
        tx: &mut Transaction<'_, Postgres>,
        dialog_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE dialogs
            SET last_message_id = (
                    SELECT id FROM messages
                    WHERE dialog_id = $1 AND deleted_at IS NULL
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                ),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(dialog_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ============================================================================
// DialogStore
// ============================================================================

#[async_trait]
impl ParticipantDirectory for PgDialogStore {
    async fn active_participant_ids(&self, dialog_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id FROM dialog_participants
            WHERE dialog_id = $1 AND left_at IS NULL
            "#,
        )
        .bind(dialog_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl DialogStore for PgDialogStore {
    async fn create_dialog(&self, dialog: NewDialog) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO dialogs (id, is_group, title, image_url, casting_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(dialog.is_group)
        .bind(&dialog.title)
        .bind(&dialog.image_url)
        .bind(dialog.casting_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => {
                Err(AppError::conflict("a dialog for this casting already exists"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_dialog(&self, dialog_id: Uuid) -> AppResult<DialogView> {
        let dialog = self.fetch_dialog_row(dialog_id).await?;
        self.hydrate(dialog).await
    }

    async fn find_dialog_by_casting(&self, casting_id: Uuid) -> AppResult<DialogView> {
        let row = sqlx::query_as::<_, DialogRow>(
            r#"
            SELECT id, is_group, title, image_url, casting_id, last_message_id, created_at, updated_at
            FROM dialogs
            WHERE casting_id = $1
            "#,
        )
        .bind(casting_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("dialog for casting"))?;

        self.hydrate(row.into()).await
    }

    async fn find_dialogs_for_user(&self, user_id: Uuid) -> AppResult<Vec<DialogView>> {
        let rows = sqlx::query_as::<_, DialogRow>(
            r#"
            SELECT d.id, d.is_group, d.title, d.image_url, d.casting_id, d.last_message_id,
                   d.created_at, d.updated_at
            FROM dialogs d
            JOIN dialog_participants p ON p.dialog_id = d.id
            WHERE p.user_id = $1 AND p.left_at IS NULL
            ORDER BY d.updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        // Hydration is deliberate per dialog; dialog lists are short.
        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.hydrate(row.into()).await?);
        }
        Ok(views)
    }

    async fn find_dialog_between_users(&self, a: Uuid, b: Uuid) -> AppResult<DialogView> {
        let dialog_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT d.id
            FROM dialogs d
            JOIN dialog_participants pa
              ON pa.dialog_id = d.id AND pa.user_id = $1 AND pa.left_at IS NULL
            JOIN dialog_participants pb
              ON pb.dialog_id = d.id AND pb.user_id = $2 AND pb.left_at IS NULL
            WHERE d.is_group = FALSE
            LIMIT 1
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("1:1 dialog between users"))?;

        self.find_dialog(dialog_id).await
    }

    async fn add_participants(&self, batch: Vec<NewParticipant>) -> AppResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for participant in &batch {
            sqlx::query(
                r#"
                INSERT INTO dialog_participants (dialog_id, user_id, role, is_muted, joined_at)
                VALUES ($1, $2, $3, FALSE, NOW())
                ON CONFLICT (dialog_id, user_id) DO NOTHING
                "#,
            )
            .bind(participant.dialog_id)
            .bind(participant.user_id)
            .bind(participant.role.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn is_user_in_dialog(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM dialog_participants
                WHERE dialog_id = $1 AND user_id = $2 AND left_at IS NULL
            )
            "#,
        )
        .bind(dialog_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn leave_dialog(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE dialog_participants
            SET left_at = NOW()
            WHERE dialog_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(dialog_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("active participant"));
        }
        Ok(())
    }

    async fn set_typing(
        &self,
        dialog_id: Uuid,
        user_id: Uuid,
        until: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE dialog_participants
            SET typing_until = $3
            WHERE dialog_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(dialog_id)
        .bind(user_id)
        .bind(until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_message(&self, message: NewMessage) -> AppResult<Message> {
        let id = Uuid::new_v4();
        let kind = message.body.kind();
        let (content, attachments, caption, system_event) = match &message.body {
            MessageBody::Text { content } => (Some(content.clone()), None, None, None),
            MessageBody::Image {
                attachments,
                caption,
            }
            | MessageBody::Video {
                attachments,
                caption,
            }
            | MessageBody::File {
                attachments,
                caption,
            } => (None, Some(attachments.clone()), caption.clone(), None),
            MessageBody::System { event } => (None, None, None, Some(event.clone())),
        };

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO messages
                (id, dialog_id, sender_id, kind, content, attachments, caption, system_event,
                 reply_to_id, forward_from_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'sent', NOW())
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(message.dialog_id)
        .bind(message.sender_id)
        .bind(kind.as_str())
        .bind(content)
        .bind(attachments)
        .bind(caption)
        .bind(system_event)
        .bind(message.reply_to_id)
        .bind(message.forward_from_id)
        .fetch_one(&mut *tx)
        .await?;

        // Same logical unit as the insert: the dialog pointer must never go
        // stale once the message row exists.
        sqlx::query(
            r#"
            UPDATE dialogs
            SET last_message_id = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(id)
        .bind(message.dialog_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn find_message(&self, message_id: Uuid) -> AppResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("message"))?;

        row.try_into()
    }

    async fn find_messages(
        &self,
        dialog_id: Uuid,
        query: MessageQuery,
    ) -> AppResult<MessagePage> {
        let limit = query.effective_limit(crate::config::DEFAULT_PAGE_SIZE, crate::config::MAX_PAGE_SIZE);
        let kind = query.kind.map(|k| k.as_str().to_string());

        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages m
            WHERE m.dialog_id = $1
              AND m.deleted_at IS NULL
              AND ($2::uuid IS NULL OR (m.created_at, m.id) <
                   (SELECT created_at, id FROM messages WHERE id = $2))
              AND ($3::uuid IS NULL OR (m.created_at, m.id) >
                   (SELECT created_at, id FROM messages WHERE id = $3))
              AND ($4::text IS NULL OR m.kind = $4)
              AND ($5::timestamptz IS NULL OR m.created_at >= $5)
              AND ($6::timestamptz IS NULL OR m.created_at <= $6)
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $7
            "#
        ))
        .bind(dialog_id)
        .bind(query.before_id)
        .bind(query.after_id)
        .bind(&kind)
        .bind(query.date_from)
        .bind(query.date_to)
        .bind(i64::from(limit) + 1)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() > limit as usize;
        let messages = rows
            .into_iter()
            .take(limit as usize)
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            WHERE m.dialog_id = $1
              AND m.deleted_at IS NULL
              AND ($2::text IS NULL OR m.kind = $2)
              AND ($3::timestamptz IS NULL OR m.created_at >= $3)
              AND ($4::timestamptz IS NULL OR m.created_at <= $4)
            "#,
        )
        .bind(dialog_id)
        .bind(&kind)
        .bind(query.date_from)
        .bind(query.date_to)
        .fetch_one(&self.pool)
        .await?;

        Ok(MessagePage {
            messages,
            total,
            has_more,
        })
    }

    async fn find_attachment_messages(
        &self,
        dialog_id: Uuid,
        kind: Option<MessageKind>,
    ) -> AppResult<Vec<Message>> {
        let kind = kind.map(|k| k.as_str().to_string());
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages m
            WHERE m.dialog_id = $1
              AND m.deleted_at IS NULL
              AND m.kind IN ('image', 'video', 'file')
              AND ($2::text IS NULL OR m.kind = $2)
            ORDER BY m.created_at DESC, m.id DESC
            "#
        ))
        .bind(dialog_id)
        .bind(&kind)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn mark_messages_read(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        // Anti-join plus the unique constraint keeps this idempotent under
        // concurrent invocations.
        let newly_read = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO message_read_receipts (message_id, user_id, read_at)
            SELECT m.id, $2, NOW()
            FROM messages m
            WHERE m.dialog_id = $1
              AND m.sender_id <> $2
              AND m.deleted_at IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM message_read_receipts r
                  WHERE r.message_id = m.id AND r.user_id = $2
              )
            ON CONFLICT (message_id, user_id) DO NOTHING
            RETURNING message_id
            "#,
        )
        .bind(dialog_id)
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        if !newly_read.is_empty() {
            sqlx::query(
                r#"
                UPDATE messages
                SET status = 'read'
                WHERE id = ANY($1)
                "#,
            )
            .bind(&newly_read)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(newly_read)
    }

    async fn unread_count(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            WHERE m.dialog_id = $1
              AND m.sender_id <> $2
              AND m.deleted_at IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM message_read_receipts r
                  WHERE r.message_id = m.id AND r.user_id = $2
              )
            "#,
        )
        .bind(dialog_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> AppResult<ReactionChange> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, String>(
            r#"
            SELECT emoji FROM message_reactions
            WHERE message_id = $1 AND user_id = $2
            FOR UPDATE
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let change = match existing.as_deref() {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO message_reactions (message_id, user_id, emoji, created_at)
                    VALUES ($1, $2, $3, NOW())
                    ON CONFLICT (message_id, user_id)
                    DO UPDATE SET emoji = EXCLUDED.emoji, created_at = EXCLUDED.created_at
                    "#,
                )
                .bind(message_id)
                .bind(user_id)
                .bind(emoji)
                .execute(&mut *tx)
                .await?;
                ReactionChange::Added
            }
            Some(current) if current == emoji => {
                sqlx::query(
                    "DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2",
                )
                .bind(message_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
                ReactionChange::Removed
            }
            Some(_) => {
                sqlx::query(
                    r#"
                    UPDATE message_reactions
                    SET emoji = $3, created_at = NOW()
                    WHERE message_id = $1 AND user_id = $2
                    "#,
                )
                .bind(message_id)
                .bind(user_id)
                .bind(emoji)
                .execute(&mut *tx)
                .await?;
                ReactionChange::Replaced
            }
        };

        tx.commit().await?;
        Ok(change)
    }

    async fn remove_reaction(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2")
            .bind(message_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reactions_for_message(&self, message_id: Uuid) -> AppResult<Vec<Reaction>> {
        let rows = sqlx::query_as::<_, ReactionRow>(
            r#"
            SELECT message_id, user_id, emoji, created_at
            FROM message_reactions
            WHERE message_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Reaction::from).collect())
    }

    async fn delete_message(&self, message_id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let dialog_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE messages
            SET deleted_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING dialog_id
            "#,
        )
        .bind(message_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("message"))?;

        Self::refresh_last_message(&mut tx, dialog_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_user_messages(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE messages
            SET deleted_at = NOW()
            WHERE dialog_id = $1 AND sender_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(dialog_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        Self::refresh_last_message(&mut tx, dialog_id).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn delete_dialog(&self, dialog_id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Explicit cascade in foreign-key order.
        sqlx::query(
            r#"
            DELETE FROM message_read_receipts
            WHERE message_id IN (SELECT id FROM messages WHERE dialog_id = $1)
            "#,
        )
        .bind(dialog_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM message_reactions
            WHERE message_id IN (SELECT id FROM messages WHERE dialog_id = $1)
            "#,
        )
        .bind(dialog_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM messages WHERE dialog_id = $1")
            .bind(dialog_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM dialog_participants WHERE dialog_id = $1")
            .bind(dialog_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM dialogs WHERE id = $1")
            .bind(dialog_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("dialog"));
        }

        tx.commit().await?;
        Ok(())
    }
}
