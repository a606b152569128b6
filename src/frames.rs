//! Wire protocol for the live connection: JSON frames `{type, payload}`.
//!
//! Client-originated types drive Chat Service calls; server-originated types
//! are pushed by the Connection Hub to every live connection of a dialog's
//! active participants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Message, MessageBody, Reaction};

/// Inbound frames, decoded by the protocol handler's read loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientFrame {
    #[serde(rename = "message.send")]
    MessageSend {
        dialog_id: Uuid,
        #[serde(flatten)]
        body: MessageBody,
        #[serde(default)]
        reply_to_id: Option<Uuid>,
        #[serde(default)]
        forward_from_id: Option<Uuid>,
    },

    #[serde(rename = "reaction.toggle")]
    ReactionToggle { message_id: Uuid, emoji: String },

    #[serde(rename = "read.mark")]
    ReadMark { dialog_id: Uuid },

    #[serde(rename = "typing.start")]
    TypingStart { dialog_id: Uuid },
}

/// Outbound frames, encoded by the protocol handler's write loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerFrame {
    #[serde(rename = "message.new")]
    MessageNew { message: Message },

    #[serde(rename = "reaction.update")]
    ReactionUpdate {
        dialog_id: Uuid,
        message_id: Uuid,
        reactions: Vec<Reaction>,
    },

    #[serde(rename = "read.receipt")]
    ReadReceipt {
        dialog_id: Uuid,
        user_id: Uuid,
        message_ids: Vec<Uuid>,
    },

    #[serde(rename = "typing.start")]
    TypingStart {
        dialog_id: Uuid,
        user_id: Uuid,
        until: DateTime<Utc>,
    },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}
