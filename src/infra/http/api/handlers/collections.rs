use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::collections::CollectionInput;
use crate::application::pagination::PageQuery;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::{AuthUser, MaybeUser};
use crate::infra::http::api::state::ApiState;

pub async fn create_collection(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Json(payload): Json<CollectionInput>,
) -> Result<impl IntoResponse, ApiError> {
    let collection = state
        .collections
        .create_collection(&principal, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

pub async fn my_collections(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.collections.list_my_collections(&principal).await?))
}

pub async fn discover_collections(
    State(state): State<ApiState>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state.collections.discover_collections(page.into()).await?,
    ))
}

pub async fn get_collection(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let collection = state.collections.get_collection(viewer.id(), id).await?;
    let stories = state
        .collections
        .collection_stories(viewer.id(), id)
        .await?;
    Ok(Json(serde_json::json!({
        "collection": collection,
        "stories": stories,
    })))
}

pub async fn update_collection(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CollectionInput>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .collections
            .update_collection(&principal, id, payload)
            .await?,
    ))
}

pub async fn delete_collection(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.collections.delete_collection(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 201 when the story was added, 200 when it was already there.
pub async fn add_collection_story(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path((id, story_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let added = state
        .collections
        .add_story(&principal, id, story_id)
        .await?;
    Ok(if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    })
}

pub async fn remove_collection_story(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path((id, story_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .collections
        .remove_story(&principal, id, story_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_collaborator(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .collections
        .add_collaborator(&principal, id, user_id)
        .await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_collaborator(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .collections
        .remove_collaborator(&principal, id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
