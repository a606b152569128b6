//! Chat Service: business rules between the request surface / protocol
//! handler and the Dialog Store, plus event emission to the Connection Hub.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::config::{ChatConfig, MAX_EMOJI_CHARS};
use crate::error::{AppError, AppResult};
use crate::frames::ServerFrame;
use crate::hub::HubHandle;
use crate::model::{DialogView, Message, MessageBody, MessageKind, ParticipantRole, Reaction};
use crate::store::{
    DialogStore, MessagePage, MessageQuery, NewDialog, NewMessage, NewParticipant, ReactionChange,
};
use crate::uploads::UploadLookup;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDialogInput {
    pub participant_ids: Vec<Uuid>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub casting_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageInput {
    pub dialog_id: Uuid,
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default)]
    pub reply_to_id: Option<Uuid>,
    #[serde(default)]
    pub forward_from_id: Option<Uuid>,
}

pub struct ToggleReactionOutcome {
    pub change: ReactionChange,
    pub reactions: Vec<Reaction>,
}

pub struct ChatService {
    store: Arc<dyn DialogStore>,
    uploads: Arc<dyn UploadLookup>,
    hub: HubHandle,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn DialogStore>,
        uploads: Arc<dyn UploadLookup>,
        hub: HubHandle,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            uploads,
            hub,
            config,
        }
    }

    // ========================================================================
    // Dialogs
    // ========================================================================

    /// Creates a dialog, or returns the existing one for idempotent cases:
    /// a second 1:1 request for the same pair resolves to the first dialog,
    /// and a duplicate casting fails with Conflict.
    pub async fn create_dialog(
        &self,
        creator_id: Uuid,
        input: CreateDialogInput,
    ) -> AppResult<DialogView> {
        let mut participant_ids = input.participant_ids.clone();
        if !participant_ids.contains(&creator_id) {
            participant_ids.push(creator_id);
        }
        participant_ids.sort();
        participant_ids.dedup();

        if participant_ids.len() < 2 {
            return Err(AppError::validation(
                "a dialog needs at least two participants",
            ));
        }
        if !input.is_group && participant_ids.len() != 2 {
            return Err(AppError::validation(
                "a 1:1 dialog has exactly two participants",
            ));
        }

        if !input.is_group {
            let other = participant_ids
                .iter()
                .copied()
                .find(|id| *id != creator_id)
                .ok_or_else(|| AppError::validation("cannot open a dialog with yourself"))?;

            match self.store.find_dialog_between_users(creator_id, other).await {
                Ok(existing) => {
                    tracing::debug!(
                        dialog_id = %existing.id(),
                        "Reusing existing 1:1 dialog"
                    );
                    return Ok(existing);
                }
                Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let dialog_id = self
            .store
            .create_dialog(NewDialog {
                is_group: input.is_group,
                title: input.title,
                image_url: input.image_url,
                casting_id: input.casting_id,
            })
            .await?;

        let batch = participant_ids
            .into_iter()
            .map(|user_id| NewParticipant {
                dialog_id,
                user_id,
                role: if user_id == creator_id {
                    ParticipantRole::Owner
                } else {
                    ParticipantRole::Member
                },
            })
            .collect();
        self.store.add_participants(batch).await?;

        tracing::info!(
            dialog_id = %dialog_id,
            is_group = input.is_group,
            casting_id = ?input.casting_id,
            "Dialog created"
        );

        self.store.find_dialog(dialog_id).await
    }

    pub async fn list_dialogs(&self, user_id: Uuid) -> AppResult<Vec<DialogView>> {
        self.store.find_dialogs_for_user(user_id).await
    }

    pub async fn leave_dialog(&self, user_id: Uuid, dialog_id: Uuid) -> AppResult<()> {
        if !self.store.is_user_in_dialog(dialog_id, user_id).await? {
            return Err(AppError::forbidden("not an active participant"));
        }
        self.store.leave_dialog(dialog_id, user_id).await?;
        tracing::info!(dialog_id = %dialog_id, "Participant left dialog");
        Ok(())
    }

    pub async fn delete_dialog(&self, user_id: Uuid, dialog_id: Uuid) -> AppResult<()> {
        let view = self.store.find_dialog(dialog_id).await?;
        let is_owner = view
            .participants
            .iter()
            .any(|p| p.user_id == user_id && p.is_active() && p.role == ParticipantRole::Owner);
        if !is_owner {
            return Err(AppError::forbidden("only the dialog owner can delete it"));
        }
        self.store.delete_dialog(dialog_id).await?;
        tracing::info!(dialog_id = %dialog_id, "Dialog deleted");
        Ok(())
    }

    // ========================================================================
    // Messages
    // ========================================================================

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        input: SendMessageInput,
    ) -> AppResult<Message> {
        if !self.store.is_user_in_dialog(input.dialog_id, sender_id).await? {
            return Err(AppError::forbidden("not an active participant"));
        }

        self.validate_body(&input.body).await?;

        let message = self
            .store
            .create_message(NewMessage {
                dialog_id: input.dialog_id,
                sender_id,
                body: input.body,
                reply_to_id: input.reply_to_id,
                forward_from_id: input.forward_from_id,
            })
            .await?;

        tracing::info!(
            dialog_id = %message.dialog_id,
            message_id = %message.id,
            kind = %message.body.kind().as_str(),
            "Message persisted"
        );

        self.hub
            .broadcast(
                message.dialog_id,
                None,
                ServerFrame::MessageNew {
                    message: message.clone(),
                },
            )
            .await;

        Ok(message)
    }

    /// Fetches a page and, as a side effect, marks the dialog read for the
    /// requesting user. The side effect's failure is logged, never surfaced.
    pub async fn get_messages(
        &self,
        user_id: Uuid,
        dialog_id: Uuid,
        mut query: MessageQuery,
    ) -> AppResult<MessagePage> {
        if !self.store.is_user_in_dialog(dialog_id, user_id).await? {
            return Err(AppError::forbidden("not an active participant"));
        }

        // Configured page-size policy is applied here, once, for every
        // caller; the store treats the limit as already settled.
        query.limit = Some(query.effective_limit(
            self.config.default_page_size,
            self.config.max_page_size,
        ));

        let page = self.store.find_messages(dialog_id, query).await?;

        if let Err(e) = self.mark_all_read(user_id, dialog_id).await {
            tracing::warn!(
                error = %e,
                dialog_id = %dialog_id,
                "Read-on-view mark failed, returning page anyway"
            );
        }

        Ok(page)
    }

    pub async fn mark_all_read(&self, user_id: Uuid, dialog_id: Uuid) -> AppResult<()> {
        if !self.store.is_user_in_dialog(dialog_id, user_id).await? {
            return Err(AppError::forbidden("not an active participant"));
        }

        let newly_read = self.store.mark_messages_read(dialog_id, user_id).await?;
        if newly_read.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            dialog_id = %dialog_id,
            count = newly_read.len(),
            "Messages marked read"
        );

        self.hub
            .broadcast(
                dialog_id,
                None,
                ServerFrame::ReadReceipt {
                    dialog_id,
                    user_id,
                    message_ids: newly_read,
                },
            )
            .await;

        Ok(())
    }

    pub async fn unread_count(&self, user_id: Uuid, dialog_id: Uuid) -> AppResult<i64> {
        if !self.store.is_user_in_dialog(dialog_id, user_id).await? {
            return Err(AppError::forbidden("not an active participant"));
        }
        self.store.unread_count(dialog_id, user_id).await
    }

    pub async fn list_attachments(
        &self,
        user_id: Uuid,
        dialog_id: Uuid,
        kind: Option<MessageKind>,
    ) -> AppResult<Vec<Message>> {
        if !self.store.is_user_in_dialog(dialog_id, user_id).await? {
            return Err(AppError::forbidden("not an active participant"));
        }
        if let Some(kind) = kind {
            if !kind.is_media() {
                return Err(AppError::validation("attachment filter must be a media kind"));
            }
        }
        self.store.find_attachment_messages(dialog_id, kind).await
    }

    /// Sender-only soft delete. Reactions and receipts on the message are
    /// retained (see DESIGN.md).
    pub async fn delete_message(&self, user_id: Uuid, message_id: Uuid) -> AppResult<()> {
        let message = self.store.find_message(message_id).await?;
        if message.sender_id != user_id {
            return Err(AppError::forbidden("only the sender can delete a message"));
        }
        self.store.delete_message(message_id).await?;
        tracing::info!(message_id = %message_id, "Message soft-deleted");
        Ok(())
    }

    // ========================================================================
    // Reactions, read state, typing
    // ========================================================================

    pub async fn toggle_reaction(
        &self,
        user_id: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> AppResult<ToggleReactionOutcome> {
        let emoji = emoji.trim();
        if emoji.is_empty() || emoji.chars().count() > MAX_EMOJI_CHARS {
            return Err(AppError::validation("unsupported emoji"));
        }

        let message = self.store.find_message(message_id).await?;
        if !self
            .store
            .is_user_in_dialog(message.dialog_id, user_id)
            .await?
        {
            return Err(AppError::forbidden("not an active participant"));
        }

        let change = self.store.toggle_reaction(message_id, user_id, emoji).await?;
        let reactions = self.store.reactions_for_message(message_id).await?;

        self.hub
            .broadcast(
                message.dialog_id,
                None,
                ServerFrame::ReactionUpdate {
                    dialog_id: message.dialog_id,
                    message_id,
                    reactions: reactions.clone(),
                },
            )
            .await;

        Ok(ToggleReactionOutcome { change, reactions })
    }

    /// Marks the user as typing and tells the other participants.
    pub async fn set_typing(&self, user_id: Uuid, dialog_id: Uuid) -> AppResult<()> {
        if !self.store.is_user_in_dialog(dialog_id, user_id).await? {
            return Err(AppError::forbidden("not an active participant"));
        }

        let until = Utc::now() + Duration::seconds(self.config.typing_ttl_secs);
        self.store.set_typing(dialog_id, user_id, until).await?;

        self.hub
            .broadcast(
                dialog_id,
                Some(user_id),
                ServerFrame::TypingStart {
                    dialog_id,
                    user_id,
                    until,
                },
            )
            .await;

        Ok(())
    }

    // ========================================================================
    // Validation
    // ========================================================================

    async fn validate_body(&self, body: &MessageBody) -> AppResult<()> {
        match body {
            MessageBody::Text { content } => {
                if content.trim().is_empty() {
                    return Err(AppError::validation("message content is empty"));
                }
                if content.len() > self.config.max_message_content_bytes {
                    return Err(AppError::validation(format!(
                        "message content exceeds {} bytes",
                        self.config.max_message_content_bytes
                    )));
                }
            }
            MessageBody::Image { attachments, .. }
            | MessageBody::Video { attachments, .. }
            | MessageBody::File { attachments, .. } => {
                if attachments.is_empty() {
                    return Err(AppError::validation("media message has no attachments"));
                }
                // Attachments are opaque ids; the upload service is the
                // authority on whether they exist.
                for attachment_id in attachments {
                    if self.uploads.find_by_id(*attachment_id).await?.is_none() {
                        return Err(AppError::validation(format!(
                            "unknown attachment {}",
                            attachment_id
                        )));
                    }
                }
            }
            MessageBody::System { .. } => {
                return Err(AppError::validation(
                    "system messages are server-generated only",
                ));
            }
        }
        Ok(())
    }
}
