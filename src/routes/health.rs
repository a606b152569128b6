use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::context::AppContext;
use crate::error::AppError;

/// GET /health
pub async fn health_check(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<Value>, AppError> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&ctx.pool)
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}
