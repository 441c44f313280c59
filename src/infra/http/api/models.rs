//! Request bodies and query strings that do not map one-to-one onto service inputs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::pagination::PageRequest;
use crate::domain::types::{ExportFormat, StorySort};

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: StorySort,
    /// Comma separated.
    pub tag_ids: Option<String>,
}

impl StoryListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }

    pub fn parsed_tag_ids(&self) -> Result<Vec<Uuid>, ApiError> {
        parse_uuid_list(self.tag_ids.as_deref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterListQuery {
    pub story_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRatingRequest {
    pub story_id: Uuid,
    pub rate: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRatingRequest {
    pub rate: i64,
}

#[derive(Debug, Deserialize)]
pub struct CommentUpdateRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: String,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagAssignRequest {
    pub tag_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub receiver_id: Uuid,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    pub format: ExportFormat,
    /// Comma separated.
    pub chapter_ids: Option<String>,
}

impl ExportQuery {
    pub fn parsed_chapter_ids(&self) -> Result<Option<Vec<Uuid>>, ApiError> {
        let ids = parse_uuid_list(self.chapter_ids.as_deref())?;
        Ok((!ids.is_empty()).then_some(ids))
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: bool,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowCheckResponse {
    pub is_following: bool,
}

fn parse_uuid_list(raw: Option<&str>) -> Result<Vec<Uuid>, ApiError> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Uuid::parse_str(part).map_err(|_| ApiError::bad_request(format!("invalid id `{part}`")))
        })
        .collect()
}
