use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::model::{Message, MessageBody};
use crate::routes::extractors::AuthenticatedUser;
use crate::service::SendMessageInput;
use crate::store::{MessagePage, MessageQuery};

#[derive(Debug, Deserialize)]
pub struct SendMessagePayload {
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default)]
    pub reply_to_id: Option<Uuid>,
    #[serde(default)]
    pub forward_from_id: Option<Uuid>,
}

/// POST /dialogs/:id/messages
pub async fn send_message(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(dialog_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let message = ctx
        .service
        .send_message(
            user.0,
            SendMessageInput {
                dialog_id,
                body: payload.body,
                reply_to_id: payload.reply_to_id,
                forward_from_id: payload.forward_from_id,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /dialogs/:id/messages
pub async fn list_messages(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(dialog_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<MessagePage>, AppError> {
    let page = ctx.service.get_messages(user.0, dialog_id, query).await?;
    Ok(Json(page))
}

/// POST /dialogs/:id/read
pub async fn mark_all_read(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(dialog_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    ctx.service.mark_all_read(user.0, dialog_id).await?;
    Ok(Json(json!({ "status": "read" })))
}

#[derive(Debug, Deserialize)]
pub struct ToggleReactionPayload {
    pub emoji: String,
}

/// POST /messages/:id/reactions
pub async fn toggle_reaction(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<ToggleReactionPayload>,
) -> Result<Json<Value>, AppError> {
    let outcome = ctx
        .service
        .toggle_reaction(user.0, message_id, &payload.emoji)
        .await?;
    Ok(Json(json!({
        "change": outcome.change,
        "reactions": outcome.reactions,
    })))
}

/// DELETE /messages/:id
pub async fn delete_message(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    ctx.service.delete_message(user.0, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
