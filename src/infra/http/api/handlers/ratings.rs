use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::{AuthUser, MaybeUser};
use crate::infra::http::api::models::{CreateRatingRequest, UpdateRatingRequest};
use crate::infra::http::api::state::ApiState;

pub async fn create_rating(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Json(payload): Json<CreateRatingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let rating = state
        .ratings
        .create_rating(&principal, payload.story_id, payload.rate)
        .await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

pub async fn list_story_ratings(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(story_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .ratings
            .list_story_ratings(viewer.id(), story_id)
            .await?,
    ))
}

pub async fn rating_stats(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(story_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ratings.rating_stats(viewer.id(), story_id).await?))
}

pub async fn update_rating(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRatingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .ratings
            .update_rating(&principal, id, payload.rate)
            .await?,
    ))
}

pub async fn delete_rating(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.ratings.delete_rating(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
