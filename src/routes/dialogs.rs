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
use crate::model::{DialogView, Message, MessageKind};
use crate::routes::extractors::AuthenticatedUser;
use crate::service::CreateDialogInput;

/// POST /dialogs
pub async fn create_dialog(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Json(input): Json<CreateDialogInput>,
) -> Result<(StatusCode, Json<DialogView>), AppError> {
    let view = ctx.service.create_dialog(user.0, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /dialogs
pub async fn list_dialogs(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<DialogView>>, AppError> {
    let views = ctx.service.list_dialogs(user.0).await?;
    Ok(Json(views))
}

/// POST /dialogs/:id/leave
pub async fn leave_dialog(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(dialog_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    ctx.service.leave_dialog(user.0, dialog_id).await?;
    Ok(Json(json!({ "status": "left" })))
}

/// DELETE /dialogs/:id
pub async fn delete_dialog(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(dialog_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    ctx.service.delete_dialog(user.0, dialog_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /dialogs/:id/unread
pub async fn unread_count(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(dialog_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let count = ctx.service.unread_count(user.0, dialog_id).await?;
    Ok(Json(json!({ "unread_count": count })))
}

#[derive(Debug, Deserialize)]
pub struct AttachmentsParams {
    pub kind: Option<MessageKind>,
}

/// GET /dialogs/:id/attachments
pub async fn list_attachments(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(dialog_id): Path<Uuid>,
    Query(params): Query<AttachmentsParams>,
) -> Result<Json<Vec<Message>>, AppError> {
    let messages = ctx
        .service
        .list_attachments(user.0, dialog_id, params.kind)
        .await?;
    Ok(Json(messages))
}
