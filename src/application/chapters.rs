//! Chapter writes and the chapter read path.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::application::access::{load_owned_story, load_visible_story, private_denied};
use crate::application::activity::{ActivityEvent, ActivityService};
use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::read_model::{ChapterView, ReadModelBuilder};
use crate::application::repos::{
    ChaptersRepo, CreateChapterParams, ReadHistoryRepo, StoriesRepo, UpdateChapterParams,
};
use crate::cache::{CacheTrigger, InvalidationMode};
use crate::domain::entities::ChapterRecord;
use crate::domain::validation::{normalize_title, validate_content};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChapterInput {
    pub story_id: Uuid,
    pub title: String,
    pub content: String,
    /// Appended after the last chapter when absent.
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChapterInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub order: Option<i32>,
}

#[derive(Clone)]
pub struct ChapterService {
    pub(crate) stories: Arc<dyn StoriesRepo>,
    pub(crate) chapters: Arc<dyn ChaptersRepo>,
    pub(crate) read_history: Arc<dyn ReadHistoryRepo>,
    pub(crate) builder: ReadModelBuilder,
    pub(crate) cache: CacheTrigger,
    pub(crate) activity: ActivityService,
}

impl ChapterService {
    pub fn new(
        stories: Arc<dyn StoriesRepo>,
        chapters: Arc<dyn ChaptersRepo>,
        read_history: Arc<dyn ReadHistoryRepo>,
        builder: ReadModelBuilder,
        cache: CacheTrigger,
        activity: ActivityService,
    ) -> Self {
        Self {
            stories,
            chapters,
            read_history,
            builder,
            cache,
            activity,
        }
    }

    /// Create a chapter. Followers hear about it unless the story is private.
    pub async fn create_chapter(
        &self,
        principal: &Principal,
        input: CreateChapterInput,
    ) -> Result<ChapterRecord, ServiceError> {
        let story = load_owned_story(self.stories.as_ref(), input.story_id, principal).await?;
        let title = normalize_title("title", &input.title)?;
        validate_content("content", &input.content)?;

        let chapter = self
            .chapters
            .create_chapter(CreateChapterParams {
                story_id: story.id,
                title,
                content: input.content,
                order: input.order,
            })
            .await?;

        self.cache
            .chapter_changed(story.id, chapter.id, InvalidationMode::BestEffort)
            .await?;
        self.activity.publish(ActivityEvent::NewChapter {
            story,
            chapter: chapter.clone(),
        });

        info!(
            target = "storytell::chapters",
            chapter_id = %chapter.id,
            story_id = %chapter.story_id,
            order = chapter.order,
            "chapter created"
        );
        Ok(chapter)
    }

    /// Chapters in ascending `order`.
    pub async fn list_chapters(
        &self,
        viewer: Option<Uuid>,
        story_id: Uuid,
    ) -> Result<Vec<ChapterRecord>, ServiceError> {
        load_visible_story(self.stories.as_ref(), story_id, viewer).await?;
        let mut chapters = self.chapters.list_for_story(story_id).await?;
        chapters.sort_by_key(|chapter| (chapter.order, chapter.created_at));
        Ok(chapters)
    }

    pub async fn get_chapter_view(
        &self,
        chapter_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<ChapterView, ServiceError> {
        let view = match self.cache.cache().chapter_view(chapter_id).await {
            Some(view) => {
                if !view.visible_to(viewer) {
                    return Err(private_denied(viewer));
                }
                view
            }
            None => {
                let view = self.builder.build_chapter_view(chapter_id).await?;
                if !view.visible_to(viewer) {
                    return Err(private_denied(viewer));
                }
                self.cache.cache().put_chapter_view(&view).await;
                view
            }
        };

        if let Some(user_id) = viewer {
            self.read_history
                .record_read(user_id, view.story_id, Some(chapter_id))
                .await?;
        }
        Ok(view)
    }

    pub async fn update_chapter(
        &self,
        principal: &Principal,
        chapter_id: Uuid,
        input: UpdateChapterInput,
    ) -> Result<ChapterRecord, ServiceError> {
        let current = self.load_chapter(chapter_id).await?;
        load_owned_story(self.stories.as_ref(), current.story_id, principal).await?;

        let title = match input.title {
            Some(title) => normalize_title("title", &title)?,
            None => current.title.clone(),
        };
        let content = match input.content {
            Some(content) => {
                validate_content("content", &content)?;
                content
            }
            None => current.content.clone(),
        };

        let updated = self
            .chapters
            .update_chapter(UpdateChapterParams {
                id: chapter_id,
                title,
                content,
                order: input.order.unwrap_or(current.order),
            })
            .await
            .map_err(ServiceError::not_found_on_missing("chapter"))?;

        self.cache
            .chapter_changed(updated.story_id, updated.id, InvalidationMode::BestEffort)
            .await?;
        Ok(updated)
    }

    pub async fn delete_chapter(
        &self,
        principal: &Principal,
        chapter_id: Uuid,
    ) -> Result<(), ServiceError> {
        let chapter = self.load_chapter(chapter_id).await?;
        load_owned_story(self.stories.as_ref(), chapter.story_id, principal).await?;

        if !self.chapters.delete_chapter(chapter_id).await? {
            return Err(ServiceError::NotFound("chapter"));
        }
        self.cache
            .chapter_removed(chapter.story_id, chapter_id)
            .await?;
        Ok(())
    }

    async fn load_chapter(&self, chapter_id: Uuid) -> Result<ChapterRecord, ServiceError> {
        self.chapters
            .find_chapter(chapter_id)
            .await?
            .ok_or(ServiceError::NotFound("chapter"))
    }
}
