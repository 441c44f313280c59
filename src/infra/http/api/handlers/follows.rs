use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::pagination::PageQuery;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::AuthUser;
use crate::infra::http::api::models::FollowCheckResponse;
use crate::infra::http::api::state::ApiState;

pub async fn follow_user(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let follow = state.follows.follow(&principal, user_id).await?;
    Ok((StatusCode::CREATED, Json(follow)))
}

pub async fn unfollow_user(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.follows.unfollow(&principal, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Activities of everyone the caller follows.
pub async fn activity_feed(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.activity.feed(principal.id, page.into()).await?))
}

pub async fn list_followers(
    State(state): State<ApiState>,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.follows.followers(user_id, page.into()).await?))
}

pub async fn list_following(
    State(state): State<ApiState>,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.follows.following(user_id, page.into()).await?))
}

pub async fn follow_stats(
    State(state): State<ApiState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.follows.stats(user_id).await?))
}

pub async fn check_following(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let is_following = state.follows.is_following(&principal, user_id).await?;
    Ok(Json(FollowCheckResponse { is_following }))
}
