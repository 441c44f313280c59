use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::AuthUser;
use crate::infra::http::api::state::ApiState;

pub async fn list_read_history(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.read_history.list_history(&principal).await?))
}

/// `null` when the caller never opened the story.
pub async fn story_read_history(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(story_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .read_history
            .story_history(&principal, story_id)
            .await?,
    ))
}
