use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::pagination::PageQuery;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::AuthUser;
use crate::infra::http::api::models::{CountResponse, MessageRequest};
use crate::infra::http::api::state::ApiState;

pub async fn send_message(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Json(payload): Json<MessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .messages
        .send_message(&principal, payload.receiver_id, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_conversations(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.messages.conversations(&principal).await?))
}

pub async fn unread_count(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.messages.unread_count(&principal).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn message_history(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .messages
            .history(&principal, user_id, page.into())
            .await?,
    ))
}

pub async fn mark_read(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.messages.mark_read(&principal, user_id).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn delete_message(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.messages.delete_message(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
