//! Tags handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::repos::TagQueryFilter;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::{AuthUser, MaybeUser};
use crate::infra::http::api::models::{CountResponse, TagAssignRequest, TagListQuery, TagRequest};
use crate::infra::http::api::state::ApiState;

pub async fn create_tag(
    State(state): State<ApiState>,
    AuthUser(_principal): AuthUser,
    Json(payload): Json<TagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tag = state
        .tags
        .create_tag(&payload.name, payload.category)
        .await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn list_tags(
    State(state): State<ApiState>,
    Query(query): Query<TagListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = TagQueryFilter {
        search: query.search,
        category: query.category,
    };
    Ok(Json(state.tags.list_tags(filter).await?))
}

pub async fn list_tag_categories(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tags.list_categories().await?))
}

pub async fn update_tag(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tag = state
        .tags
        .update_tag(&principal, id, &payload.name, payload.category)
        .await?;
    Ok(Json(tag))
}

pub async fn delete_tag(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.tags.delete_tag(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn story_tags(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(story_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tags.story_tags(viewer.id(), story_id).await?))
}

/// Replaces the story's whole tag set.
pub async fn assign_story_tags(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(story_id): Path<Uuid>,
    Json(payload): Json<TagAssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tags = state
        .tags
        .assign_tags(&principal, story_id, payload.tag_ids)
        .await?;
    Ok(Json(tags))
}

pub async fn clear_story_tags(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(story_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.tags.clear_tags(&principal, story_id).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn remove_story_tag(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path((story_id, tag_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state.tags.remove_tag(&principal, story_id, tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
