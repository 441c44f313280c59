use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::comments::CreateCommentInput;
use crate::application::pagination::PageQuery;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::{AuthUser, MaybeUser};
use crate::infra::http::api::models::CommentUpdateRequest;
use crate::infra::http::api::state::ApiState;

pub async fn create_comment(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Json(payload): Json<CreateCommentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state.comments.create_comment(&principal, payload).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Root comments only; replies come from the thread endpoint.
pub async fn list_story_comments(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(story_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .comments
            .list_story_comments(viewer.id(), story_id, page.into())
            .await?,
    ))
}

pub async fn list_chapter_comments(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(chapter_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .comments
            .list_chapter_comments(viewer.id(), chapter_id)
            .await?,
    ))
}

pub async fn comment_thread(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.comments.comment_thread(viewer.id(), id).await?))
}

pub async fn update_comment(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .comments
            .update_comment(&principal, id, &payload.content)
            .await?,
    ))
}

pub async fn delete_comment(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.comments.delete_comment(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
