//! Request surface exposed to the external router collaborator.

mod dialogs;
pub mod extractors;
mod health;
mod messages;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::ws;

pub fn create_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Dialogs
        .route(
            "/dialogs",
            post(dialogs::create_dialog).get(dialogs::list_dialogs),
        )
        .route("/dialogs/:id", delete(dialogs::delete_dialog))
        .route("/dialogs/:id/leave", post(dialogs::leave_dialog))
        .route("/dialogs/:id/unread", get(dialogs::unread_count))
        .route("/dialogs/:id/attachments", get(dialogs::list_attachments))
        // Messages
        .route(
            "/dialogs/:id/messages",
            post(messages::send_message).get(messages::list_messages),
        )
        .route("/dialogs/:id/read", post(messages::mark_all_read))
        .route("/messages/:id", delete(messages::delete_message))
        .route("/messages/:id/reactions", post(messages::toggle_reaction))
        // Live connection
        .route("/ws", get(ws::ws_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(ctx)
}
