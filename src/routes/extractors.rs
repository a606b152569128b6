//! Axum extractors for the request surface.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;

/// Already-authenticated user identity, supplied by the upstream gateway in
/// `x-user-id`. The chat core performs no credential verification.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::forbidden("missing authenticated identity").into_response()
            })?;

        let user_id = Uuid::parse_str(header).map_err(|_| {
            AppError::validation("malformed x-user-id header").into_response()
        })?;

        Ok(AuthenticatedUser(user_id))
    }
}
