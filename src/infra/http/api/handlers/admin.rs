//! Admin-only listings. The service rejects non-admin principals.

use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;

use crate::application::pagination::PageQuery;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::AuthUser;
use crate::infra::http::api::state::ApiState;

pub async fn admin_list_users(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.admin.list_users(&principal, page.into()).await?))
}

pub async fn admin_list_stories(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.admin.list_stories(&principal, page.into()).await?))
}

pub async fn admin_list_chapters(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.admin.list_chapters(&principal, page.into()).await?))
}

pub async fn admin_list_comments(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.admin.list_comments(&principal, page.into()).await?))
}
