//! Story handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::repos::StoryQueryFilter;
use crate::application::stories::{CreateStoryInput, UpdateStoryInput};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::{AuthUser, MaybeUser};
use crate::infra::http::api::models::StoryListQuery;
use crate::infra::http::api::state::ApiState;

pub async fn create_story(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Json(payload): Json<CreateStoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    let story = state.stories.create_story(&principal, payload).await?;
    Ok((StatusCode::CREATED, Json(story)))
}

pub async fn list_stories(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Query(query): Query<StoryListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = StoryQueryFilter {
        search: query.search.clone(),
        tag_ids: query.parsed_tag_ids()?,
        sort: query.sort,
        viewer: viewer.id(),
    };
    let page = state
        .stories
        .list_stories(viewer.id(), filter, query.page_request())
        .await?;
    Ok(Json(page))
}

pub async fn list_user_stories(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state.stories.list_user_stories(viewer.id(), user_id).await?,
    ))
}

/// Served from the view cache when warm.
pub async fn get_story(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.stories.get_story_view(id, viewer.id()).await?))
}

pub async fn update_story(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state.stories.update_story(&principal, id, payload).await?,
    ))
}

pub async fn delete_story(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.stories.delete_story(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
