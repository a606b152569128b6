//! Shared test harness: an in-memory Dialog Store double and a fake upload
//! lookup, so service-level behavior is exercised without Postgres.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use stagecast_chat::config::ChatConfig;
use stagecast_chat::error::{AppError, AppResult};
use stagecast_chat::hub::{ChatHub, HubHandle};
use stagecast_chat::model::{
    Deletion, Dialog, DialogView, Message, MessageKind, MessageStatus, Participant,
    ParticipantRole, Reaction, ReadReceipt,
};
use stagecast_chat::service::ChatService;
use stagecast_chat::store::{
    DialogStore, MessagePage, MessageQuery, NewDialog, NewMessage, NewParticipant,
    ParticipantDirectory, ReactionChange,
};
use stagecast_chat::uploads::{UploadLookup, UploadRecord};

use std::sync::Arc;

#[derive(Default)]
struct Inner {
    dialogs: HashMap<Uuid, Dialog>,
    participants: Vec<Participant>,
    messages: Vec<Message>,
    reactions: Vec<Reaction>,
    receipts: Vec<ReadReceipt>,
    seq: i64,
}

impl Inner {
    /// Strictly increasing timestamps so (created_at, id) ordering is total.
    fn next_instant(&mut self) -> DateTime<Utc> {
        self.seq += 1;
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(self.seq)
    }

    fn sort_key(&self, message_id: Uuid) -> Option<(DateTime<Utc>, Uuid)> {
        self.messages
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| (m.created_at, m.id))
    }

    fn newest_active_message_id(&self, dialog_id: Uuid) -> Option<Uuid> {
        self.messages
            .iter()
            .filter(|m| m.dialog_id == dialog_id && !m.deletion.is_deleted())
            .max_by_key(|m| (m.created_at, m.id))
            .map(|m| m.id)
    }

    fn hydrate(&self, dialog: &Dialog) -> DialogView {
        let participants = self
            .participants
            .iter()
            .filter(|p| p.dialog_id == dialog.id)
            .cloned()
            .collect();
        let last_message = dialog
            .last_message_id
            .and_then(|id| self.messages.iter().find(|m| m.id == id).cloned());
        DialogView {
            dialog: dialog.clone(),
            participants,
            last_message,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receipt_count(&self) -> usize {
        self.inner.lock().unwrap().receipts.len()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }
}

#[async_trait]
impl ParticipantDirectory for MemoryStore {
    async fn active_participant_ids(&self, dialog_id: Uuid) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .participants
            .iter()
            .filter(|p| p.dialog_id == dialog_id && p.is_active())
            .map(|p| p.user_id)
            .collect())
    }
}

#[async_trait]
impl DialogStore for MemoryStore {
    async fn create_dialog(&self, dialog: NewDialog) -> AppResult<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(casting_id) = dialog.casting_id {
            if inner
                .dialogs
                .values()
                .any(|d| d.casting_id == Some(casting_id))
            {
                return Err(AppError::conflict(
                    "a dialog for this casting already exists",
                ));
            }
        }
        let now = inner.next_instant();
        let id = Uuid::new_v4();
        inner.dialogs.insert(
            id,
            Dialog {
                id,
                is_group: dialog.is_group,
                title: dialog.title,
                image_url: dialog.image_url,
                casting_id: dialog.casting_id,
                last_message_id: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn find_dialog(&self, dialog_id: Uuid) -> AppResult<DialogView> {
        let inner = self.inner.lock().unwrap();
        let dialog = inner
            .dialogs
            .get(&dialog_id)
            .ok_or_else(|| AppError::not_found("dialog"))?;
        Ok(inner.hydrate(dialog))
    }

    async fn find_dialog_by_casting(&self, casting_id: Uuid) -> AppResult<DialogView> {
        let inner = self.inner.lock().unwrap();
        let dialog = inner
            .dialogs
            .values()
            .find(|d| d.casting_id == Some(casting_id))
            .ok_or_else(|| AppError::not_found("dialog for casting"))?;
        Ok(inner.hydrate(dialog))
    }

    async fn find_dialogs_for_user(&self, user_id: Uuid) -> AppResult<Vec<DialogView>> {
        let inner = self.inner.lock().unwrap();
        let mut views: Vec<DialogView> = inner
            .dialogs
            .values()
            .filter(|d| {
                inner
                    .participants
                    .iter()
                    .any(|p| p.dialog_id == d.id && p.user_id == user_id && p.is_active())
            })
            .map(|d| inner.hydrate(d))
            .collect();
        views.sort_by(|a, b| b.dialog.updated_at.cmp(&a.dialog.updated_at));
        Ok(views)
    }

    async fn find_dialog_between_users(&self, a: Uuid, b: Uuid) -> AppResult<DialogView> {
        let inner = self.inner.lock().unwrap();
        let dialog = inner
            .dialogs
            .values()
            .find(|d| {
                !d.is_group
                    && [a, b].iter().all(|user| {
                        inner.participants.iter().any(|p| {
                            p.dialog_id == d.id && p.user_id == *user && p.is_active()
                        })
                    })
            })
            .ok_or_else(|| AppError::not_found("1:1 dialog between users"))?;
        Ok(inner.hydrate(dialog))
    }

    async fn add_participants(&self, batch: Vec<NewParticipant>) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for new in batch {
            let exists = inner
                .participants
                .iter()
                .any(|p| p.dialog_id == new.dialog_id && p.user_id == new.user_id);
            if exists {
                continue;
            }
            let now = inner.next_instant();
            inner.participants.push(Participant {
                dialog_id: new.dialog_id,
                user_id: new.user_id,
                role: new.role,
                is_muted: false,
                typing_until: None,
                last_seen_at: None,
                joined_at: now,
                left_at: None,
            });
        }
        Ok(())
    }

    async fn is_user_in_dialog(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .participants
            .iter()
            .any(|p| p.dialog_id == dialog_id && p.user_id == user_id && p.is_active()))
    }

    async fn leave_dialog(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.next_instant();
        let participant = inner
            .participants
            .iter_mut()
            .find(|p| p.dialog_id == dialog_id && p.user_id == user_id && p.is_active())
            .ok_or_else(|| AppError::not_found("active participant"))?;
        participant.left_at = Some(now);
        Ok(())
    }

    async fn set_typing(
        &self,
        dialog_id: Uuid,
        user_id: Uuid,
        until: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(participant) = inner
            .participants
            .iter_mut()
            .find(|p| p.dialog_id == dialog_id && p.user_id == user_id && p.is_active())
        {
            participant.typing_until = Some(until);
        }
        Ok(())
    }

    async fn create_message(&self, message: NewMessage) -> AppResult<Message> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.dialogs.contains_key(&message.dialog_id) {
            return Err(AppError::not_found("dialog"));
        }
        let now = inner.next_instant();
        let persisted = Message {
            id: Uuid::new_v4(),
            dialog_id: message.dialog_id,
            sender_id: message.sender_id,
            body: message.body,
            reply_to_id: message.reply_to_id,
            forward_from_id: message.forward_from_id,
            status: MessageStatus::Sent,
            deletion: Deletion::Active,
            created_at: now,
        };
        inner.messages.push(persisted.clone());
        let dialog = inner.dialogs.get_mut(&message.dialog_id).unwrap();
        dialog.last_message_id = Some(persisted.id);
        dialog.updated_at = now;
        Ok(persisted)
    }

    async fn find_message(&self, message_id: Uuid) -> AppResult<Message> {
        let inner = self.inner.lock().unwrap();
        inner
            .messages
            .iter()
            .find(|m| m.id == message_id && !m.deletion.is_deleted())
            .cloned()
            .ok_or_else(|| AppError::not_found("message"))
    }

    async fn find_messages(
        &self,
        dialog_id: Uuid,
        query: MessageQuery,
    ) -> AppResult<MessagePage> {
        let inner = self.inner.lock().unwrap();
        let limit = query.effective_limit(50, 100) as usize;

        let matches_filters = |m: &Message| {
            m.dialog_id == dialog_id
                && !m.deletion.is_deleted()
                && query.kind.map_or(true, |k| m.body.kind() == k)
                && query.date_from.map_or(true, |from| m.created_at >= from)
                && query.date_to.map_or(true, |to| m.created_at <= to)
        };

        let before = query.before_id.and_then(|id| inner.sort_key(id));
        let after = query.after_id.and_then(|id| inner.sort_key(id));

        let mut selected: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| matches_filters(m))
            .filter(|m| before.map_or(true, |key| (m.created_at, m.id) < key))
            .filter(|m| after.map_or(true, |key| (m.created_at, m.id) > key))
            .cloned()
            .collect();
        selected.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let has_more = selected.len() > limit;
        selected.truncate(limit);

        let total = inner.messages.iter().filter(|m| matches_filters(m)).count() as i64;

        Ok(MessagePage {
            messages: selected,
            total,
            has_more,
        })
    }

    async fn find_attachment_messages(
        &self,
        dialog_id: Uuid,
        kind: Option<MessageKind>,
    ) -> AppResult<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        let mut selected: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| {
                m.dialog_id == dialog_id
                    && !m.deletion.is_deleted()
                    && m.body.kind().is_media()
                    && kind.map_or(true, |k| m.body.kind() == k)
            })
            .cloned()
            .collect();
        selected.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(selected)
    }

    async fn mark_messages_read(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.next_instant();

        let unread: Vec<Uuid> = inner
            .messages
            .iter()
            .filter(|m| {
                m.dialog_id == dialog_id
                    && m.sender_id != user_id
                    && !m.deletion.is_deleted()
                    && !inner
                        .receipts
                        .iter()
                        .any(|r| r.message_id == m.id && r.user_id == user_id)
            })
            .map(|m| m.id)
            .collect();

        for message_id in &unread {
            inner.receipts.push(ReadReceipt {
                message_id: *message_id,
                user_id,
                read_at: now,
            });
        }
        for message in inner.messages.iter_mut() {
            if unread.contains(&message.id) {
                message.status = MessageStatus::Read;
            }
        }
        Ok(unread)
    }

    async fn unread_count(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .messages
            .iter()
            .filter(|m| {
                m.dialog_id == dialog_id
                    && m.sender_id != user_id
                    && !m.deletion.is_deleted()
                    && !inner
                        .receipts
                        .iter()
                        .any(|r| r.message_id == m.id && r.user_id == user_id)
            })
            .count();
        Ok(count as i64)
    }

    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> AppResult<ReactionChange> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.next_instant();
        let existing = inner
            .reactions
            .iter()
            .position(|r| r.message_id == message_id && r.user_id == user_id);

        match existing {
            None => {
                inner.reactions.push(Reaction {
                    message_id,
                    user_id,
                    emoji: emoji.to_string(),
                    created_at: now,
                });
                Ok(ReactionChange::Added)
            }
            Some(idx) if inner.reactions[idx].emoji == emoji => {
                inner.reactions.remove(idx);
                Ok(ReactionChange::Removed)
            }
            Some(idx) => {
                inner.reactions[idx].emoji = emoji.to_string();
                inner.reactions[idx].created_at = now;
                Ok(ReactionChange::Replaced)
            }
        }
    }

    async fn remove_reaction(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .reactions
            .retain(|r| !(r.message_id == message_id && r.user_id == user_id));
        Ok(())
    }

    async fn reactions_for_message(&self, message_id: Uuid) -> AppResult<Vec<Reaction>> {
        let inner = self.inner.lock().unwrap();
        let mut reactions: Vec<Reaction> = inner
            .reactions
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect();
        reactions.sort_by_key(|r| r.created_at);
        Ok(reactions)
    }

    async fn delete_message(&self, message_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.next_instant();
        let dialog_id = {
            let message = inner
                .messages
                .iter_mut()
                .find(|m| m.id == message_id && !m.deletion.is_deleted())
                .ok_or_else(|| AppError::not_found("message"))?;
            message.deletion = Deletion::Deleted { at: now };
            message.dialog_id
        };
        let newest = inner.newest_active_message_id(dialog_id);
        if let Some(dialog) = inner.dialogs.get_mut(&dialog_id) {
            dialog.last_message_id = newest;
            dialog.updated_at = now;
        }
        Ok(())
    }

    async fn delete_user_messages(&self, dialog_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.next_instant();
        let mut deleted = 0u64;
        for message in inner.messages.iter_mut() {
            if message.dialog_id == dialog_id
                && message.sender_id == user_id
                && !message.deletion.is_deleted()
            {
                message.deletion = Deletion::Deleted { at: now };
                deleted += 1;
            }
        }
        let newest = inner.newest_active_message_id(dialog_id);
        if let Some(dialog) = inner.dialogs.get_mut(&dialog_id) {
            dialog.last_message_id = newest;
            dialog.updated_at = now;
        }
        Ok(deleted)
    }

    async fn delete_dialog(&self, dialog_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.dialogs.remove(&dialog_id).is_none() {
            return Err(AppError::not_found("dialog"));
        }
        let message_ids: HashSet<Uuid> = inner
            .messages
            .iter()
            .filter(|m| m.dialog_id == dialog_id)
            .map(|m| m.id)
            .collect();
        inner.receipts.retain(|r| !message_ids.contains(&r.message_id));
        inner
            .reactions
            .retain(|r| !message_ids.contains(&r.message_id));
        inner.messages.retain(|m| m.dialog_id != dialog_id);
        inner.participants.retain(|p| p.dialog_id != dialog_id);
        Ok(())
    }
}

/// Upload lookup double: resolves every id unless a known set is given.
pub struct FakeUploads {
    known: Option<HashSet<Uuid>>,
}

impl FakeUploads {
    pub fn any() -> Self {
        Self { known: None }
    }

    pub fn allowing(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            known: Some(ids.into_iter().collect()),
        }
    }
}

#[async_trait]
impl UploadLookup for FakeUploads {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<UploadRecord>> {
        let resolved = match &self.known {
            None => true,
            Some(known) => known.contains(&id),
        };
        Ok(resolved.then(|| UploadRecord {
            id,
            file_name: "headshot.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            size_bytes: 1024,
        }))
    }

    async fn find_by_entity(
        &self,
        _entity_type: &str,
        _entity_id: Uuid,
    ) -> AppResult<Vec<UploadRecord>> {
        Ok(Vec::new())
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub service: ChatService,
    pub hub: HubHandle,
    pub hub_task: tokio::task::JoinHandle<()>,
}

/// Wires a service against the in-memory store and a real hub actor.
pub fn spawn_app() -> TestApp {
    spawn_app_with(ChatConfig::default(), FakeUploads::any())
}

pub fn spawn_app_with_uploads(uploads: FakeUploads) -> TestApp {
    spawn_app_with(ChatConfig::default(), uploads)
}

pub fn spawn_app_with_config(config: ChatConfig) -> TestApp {
    spawn_app_with(config, FakeUploads::any())
}

fn spawn_app_with(config: ChatConfig, uploads: FakeUploads) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let (hub, hub_task) = ChatHub::start(store.clone(), &config);
    let service = ChatService::new(store.clone(), Arc::new(uploads), hub.clone(), config);
    TestApp {
        store,
        service,
        hub,
        hub_task,
    }
}

impl TestApp {
    pub async fn shutdown(self) {
        self.hub.shutdown().await;
        let _ = self.hub_task.await;
    }
}

pub fn text_body(content: &str) -> stagecast_chat::model::MessageBody {
    stagecast_chat::model::MessageBody::Text {
        content: content.to_string(),
    }
}

pub fn role_of(view: &DialogView, user_id: Uuid) -> Option<ParticipantRole> {
    view.participants
        .iter()
        .find(|p| p.user_id == user_id)
        .map(|p| p.role)
}
