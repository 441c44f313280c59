//! Shared domain enumerations aligned with persisted database values.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "story_status", rename_all = "snake_case")]
pub enum StoryStatus {
    #[default]
    Ongoing,
    Cancelled,
    Dropped,
    Completed,
}

impl StoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StoryStatus::Ongoing => "ongoing",
            StoryStatus::Cancelled => "cancelled",
            StoryStatus::Dropped => "dropped",
            StoryStatus::Completed => "completed",
        }
    }
}

/// Feed event kinds. Persisted as upper-case strings in `activity_feed.activity_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    NewStory,
    NewChapter,
    StatusChange,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::NewStory => "NEW_STORY",
            ActivityType::NewChapter => "NEW_CHAPTER",
            ActivityType::StatusChange => "STATUS_CHANGE",
        }
    }
}

impl TryFrom<&str> for ActivityType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "NEW_STORY" => Ok(ActivityType::NewStory),
            "NEW_CHAPTER" => Ok(ActivityType::NewChapter),
            "STATUS_CHANGE" => Ok(ActivityType::StatusChange),
            _ => Err(()),
        }
    }
}

/// Ordering accepted by the story listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum StorySort {
    #[default]
    #[serde(rename = "newest")]
    Newest,
    #[serde(rename = "oldest")]
    Oldest,
    #[serde(rename = "title-asc")]
    TitleAsc,
    #[serde(rename = "title-desc")]
    TitleDesc,
}

impl StorySort {
    pub fn order_by(self) -> &'static str {
        match self {
            StorySort::Newest => "s.created_at DESC, s.id DESC",
            StorySort::Oldest => "s.created_at ASC, s.id ASC",
            StorySort::TitleAsc => "LOWER(s.title) ASC, s.id ASC",
            StorySort::TitleDesc => "LOWER(s.title) DESC, s.id DESC",
        }
    }
}

/// Story export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Txt,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Html => "html",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
        }
    }
}
