//! Denormalized story and chapter views.
//!
//! The builder is a pure function of current store state: it never touches
//! the cache and never records side effects. Callers decide what to do with
//! the result (serve it, cache it, or both).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::try_join;
use uuid::Uuid;

use crate::application::error::ServiceError;
use crate::application::repos::{
    ChaptersRepo, CommentWithAuthor, CommentsRepo, RatingsRepo, StoriesRepo, TagsRepo,
};
use crate::domain::types::StoryStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub author_id: Uuid,
    pub author_username: String,
    pub is_private: bool,
    pub status: StoryStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub chapters: Vec<ChapterSummary>,
    pub comments: Vec<CommentView>,
    pub tags: Vec<String>,
    pub rating: RatingSummary,
}

impl StoryView {
    pub fn visible_to(&self, viewer: Option<Uuid>) -> bool {
        !self.is_private || viewer == Some(self.author_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSummary {
    pub id: Uuid,
    pub title: String,
    pub order: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub count: i64,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub order: i32,
    pub story_id: Uuid,
    pub story_author_id: Uuid,
    pub story_is_private: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub comments: Vec<CommentView>,
}

impl ChapterView {
    pub fn visible_to(&self, viewer: Option<Uuid>) -> bool {
        !self.story_is_private || viewer == Some(self.story_author_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub content: String,
    pub author_id: Uuid,
    pub author_username: String,
    pub chapter_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<CommentWithAuthor> for CommentView {
    fn from(row: CommentWithAuthor) -> Self {
        Self {
            id: row.comment.id,
            content: row.comment.content,
            author_id: row.comment.author_id,
            author_username: row.author_username,
            chapter_id: row.comment.chapter_id,
            parent_id: row.comment.parent_id,
            created_at: row.comment.created_at,
        }
    }
}

#[derive(Clone)]
pub struct ReadModelBuilder {
    stories: Arc<dyn StoriesRepo>,
    chapters: Arc<dyn ChaptersRepo>,
    comments: Arc<dyn CommentsRepo>,
    tags: Arc<dyn TagsRepo>,
    ratings: Arc<dyn RatingsRepo>,
}

impl ReadModelBuilder {
    pub fn new(
        stories: Arc<dyn StoriesRepo>,
        chapters: Arc<dyn ChaptersRepo>,
        comments: Arc<dyn CommentsRepo>,
        tags: Arc<dyn TagsRepo>,
        ratings: Arc<dyn RatingsRepo>,
    ) -> Self {
        Self {
            stories,
            chapters,
            comments,
            tags,
            ratings,
        }
    }

    pub async fn build_story_view(&self, story_id: Uuid) -> Result<StoryView, ServiceError> {
        let header = self
            .stories
            .find_story_with_author(story_id)
            .await?
            .ok_or(ServiceError::NotFound("story"))?;

        let (mut chapters, mut comments, tags, stats) = try_join!(
            self.chapters.list_for_story(story_id),
            self.comments.list_root_for_story(story_id),
            self.tags.list_for_story(story_id),
            self.ratings.stats_for_story(story_id),
        )?;

        // Repositories already order these; re-sorting keeps fakes and adapters honest.
        chapters.sort_by_key(|chapter| (chapter.order, chapter.created_at));
        comments.retain(|row| row.comment.parent_id.is_none());
        comments.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));

        let story = header.story;
        Ok(StoryView {
            id: story.id,
            title: story.title,
            description: story.description,
            author_id: story.author_id,
            author_username: header.author_username,
            is_private: story.is_private,
            status: story.status,
            created_at: story.created_at,
            chapters: chapters
                .into_iter()
                .map(|chapter| ChapterSummary {
                    id: chapter.id,
                    title: chapter.title,
                    order: chapter.order,
                    created_at: chapter.created_at,
                })
                .collect(),
            comments: comments.into_iter().map(CommentView::from).collect(),
            tags: sorted_tag_names(tags),
            rating: RatingSummary {
                count: stats.count,
                average: stats.average,
            },
        })
    }

    pub async fn build_chapter_view(&self, chapter_id: Uuid) -> Result<ChapterView, ServiceError> {
        let chapter = self
            .chapters
            .find_chapter(chapter_id)
            .await?
            .ok_or(ServiceError::NotFound("chapter"))?;
        let (story, mut comments) = try_join!(
            self.stories.find_story(chapter.story_id),
            self.comments.list_for_chapter(chapter_id),
        )?;
        let story = story.ok_or(ServiceError::NotFound("story"))?;

        comments.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));

        Ok(ChapterView {
            id: chapter.id,
            title: chapter.title,
            content: chapter.content,
            order: chapter.order,
            story_id: story.id,
            story_author_id: story.author_id,
            story_is_private: story.is_private,
            created_at: chapter.created_at,
            comments: comments.into_iter().map(CommentView::from).collect(),
        })
    }
}

/// Tag names ordered by `(category, name)`; uncategorized tags sort first.
fn sorted_tag_names(mut tags: Vec<crate::domain::entities::TagRecord>) -> Vec<String> {
    tags.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    tags.into_iter().map(|tag| tag.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::TagRecord;

    fn tag(name: &str, category: Option<&str>) -> TagRecord {
        TagRecord {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.map(str::to_string),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn tags_sort_by_category_then_name() {
        let names = sorted_tag_names(vec![
            tag("zombies", Some("genre")),
            tag("Angst", Some("mood")),
            tag("adventure", Some("genre")),
            tag("oneshot", None),
        ]);
        assert_eq!(names, ["oneshot", "adventure", "zombies", "Angst"]);
    }

    #[test]
    fn story_view_serializes_camel_case() {
        let view = StoryView {
            id: Uuid::nil(),
            title: "t".into(),
            description: None,
            author_id: Uuid::nil(),
            author_username: "ann".into(),
            is_private: false,
            status: StoryStatus::Completed,
            created_at: OffsetDateTime::UNIX_EPOCH,
            chapters: Vec::new(),
            comments: Vec::new(),
            tags: vec!["a".into()],
            rating: RatingSummary {
                count: 0,
                average: None,
            },
        };
        let value = serde_json::to_value(&view).expect("serialize view");
        assert_eq!(value["authorUsername"], "ann");
        assert_eq!(value["isPrivate"], false);
        assert_eq!(value["status"], "completed");
        assert_eq!(value["createdAt"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn chapter_view_visibility_follows_story() {
        let author = Uuid::new_v4();
        let view = ChapterView {
            id: Uuid::new_v4(),
            title: "c".into(),
            content: String::new(),
            order: 1,
            story_id: Uuid::new_v4(),
            story_author_id: author,
            story_is_private: true,
            created_at: OffsetDateTime::now_utc(),
            comments: Vec::new(),
        };
        assert!(view.visible_to(Some(author)));
        assert!(!view.visible_to(None));
    }
}
