use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::chapters::{CreateChapterInput, UpdateChapterInput};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::{AuthUser, MaybeUser};
use crate::infra::http::api::models::ChapterListQuery;
use crate::infra::http::api::state::ApiState;

pub async fn create_chapter(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Json(payload): Json<CreateChapterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let chapter = state.chapters.create_chapter(&principal, payload).await?;
    Ok((StatusCode::CREATED, Json(chapter)))
}

pub async fn list_chapters(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Query(query): Query<ChapterListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .chapters
            .list_chapters(viewer.id(), query.story_id)
            .await?,
    ))
}

pub async fn get_chapter(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chapters.get_chapter_view(id, viewer.id()).await?))
}

pub async fn update_chapter(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateChapterInput>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state.chapters.update_chapter(&principal, id, payload).await?,
    ))
}

pub async fn delete_chapter(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.chapters.delete_chapter(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
