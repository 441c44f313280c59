use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extractors::{AuthUser, MaybeUser};
use crate::infra::http::api::models::ExportQuery;
use crate::infra::http::api::state::ApiState;

/// Rendered story as an attachment download.
pub async fn export_story(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let chapter_ids = query.parsed_chapter_ids()?;
    let file = state
        .export
        .export_story(viewer.id(), id, query.format, chapter_ids)
        .await?;

    let mut response = file.body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(file.content_type),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file.filename))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

pub async fn export_backup(
    State(state): State<ApiState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.export.export_backup(&principal).await?))
}
