use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::pagination::PageQuery;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::AuthUser;
use crate::infra::http::api::models::StatusResponse;
use crate::infra::http::api::state::ApiState;

pub async fn create_bookmark(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(story_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let bookmark = state.bookmarks.create_bookmark(&principal, story_id).await?;
    Ok((StatusCode::CREATED, Json(bookmark)))
}

pub async fn delete_bookmark(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(story_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.bookmarks.delete_bookmark(&principal, story_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_bookmarks(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .bookmarks
            .list_bookmarks(&principal, page.into())
            .await?,
    ))
}

pub async fn bookmark_status(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(story_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.bookmarks.bookmark_status(&principal, story_id).await?;
    Ok(Json(StatusResponse { status }))
}
