//! Story writes and the story read path.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::application::access::{load_owned_story, private_denied};
use crate::application::activity::{ActivityEvent, ActivityService};
use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::pagination::{PageRequest, Paginated};
use crate::application::read_model::{ReadModelBuilder, StoryView};
use crate::application::repos::{
    ChaptersRepo, CreateStoryParams, ReadHistoryRepo, StoriesRepo, StoryListItem,
    StoryQueryFilter, UpdateStoryParams,
};
use crate::cache::{CacheTrigger, InvalidationMode};
use crate::domain::entities::StoryRecord;
use crate::domain::types::StoryStatus;
use crate::domain::validation::{normalize_optional, normalize_title};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoryInput {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub status: StoryStatus,
}

/// Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStoryInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_private: Option<bool>,
    pub status: Option<StoryStatus>,
}

#[derive(Clone)]
pub struct StoryService {
    pub(crate) stories: Arc<dyn StoriesRepo>,
    pub(crate) chapters: Arc<dyn ChaptersRepo>,
    pub(crate) read_history: Arc<dyn ReadHistoryRepo>,
    pub(crate) builder: ReadModelBuilder,
    pub(crate) cache: CacheTrigger,
    pub(crate) activity: ActivityService,
}

impl StoryService {
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

    pub async fn create_story(
        &self,
        principal: &Principal,
        input: CreateStoryInput,
    ) -> Result<StoryRecord, ServiceError> {
        let title = normalize_title("title", &input.title)?;
        let story = self
            .stories
            .create_story(CreateStoryParams {
                author_id: principal.id,
                title,
                description: normalize_optional(input.description),
                is_private: input.is_private,
                status: input.status,
            })
            .await?;

        self.cache
            .story_changed(story.id, InvalidationMode::BestEffort)
            .await?;
        self.activity.publish(ActivityEvent::NewStory {
            story: story.clone(),
        });

        info!(
            target = "storytell::stories",
            story_id = %story.id,
            author_id = %story.author_id,
            is_private = story.is_private,
            "story created"
        );
        Ok(story)
    }

    /// Public stories plus the viewer's own private ones.
    pub async fn list_stories(
        &self,
        viewer: Option<Uuid>,
        mut filter: StoryQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<StoryListItem>, ServiceError> {
        filter.viewer = viewer;
        filter.search = normalize_optional(filter.search);
        Ok(self.stories.list_stories(&filter, page).await?)
    }

    /// Stories of one author; private ones only when the author asks.
    pub async fn list_user_stories(
        &self,
        viewer: Option<Uuid>,
        author_id: Uuid,
    ) -> Result<Vec<StoryRecord>, ServiceError> {
        let include_private = viewer == Some(author_id);
        Ok(self
            .stories
            .list_by_author(author_id, include_private)
            .await?)
    }

    /// Serve the story view, from cache when possible.
    ///
    /// A cache hit is still checked against the viewer. Authenticated viewers
    /// get a read-history entry on every successful read.
    ///
    /// A miss that built the view before a concurrent switch to private can
    /// store that public view after the switch's strict invalidation. Other
    /// readers may then be served it until the refresh scheduled by the
    /// switch overwrites it, or until the TTL if that refresh lost the race.
    pub async fn get_story_view(
        &self,
        story_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<StoryView, ServiceError> {
        let view = match self.cache.cache().story_view(story_id).await {
            Some(view) => {
                if !view.visible_to(viewer) {
                    return Err(private_denied(viewer));
                }
                view
            }
            None => {
                let view = self.builder.build_story_view(story_id).await?;
                if !view.visible_to(viewer) {
                    return Err(private_denied(viewer));
                }
                self.cache.cache().put_story_view(&view).await;
                view
            }
        };

        if let Some(user_id) = viewer {
            self.read_history
                .record_read(user_id, story_id, None)
                .await?;
        }
        Ok(view)
    }

    pub async fn update_story(
        &self,
        principal: &Principal,
        story_id: Uuid,
        input: UpdateStoryInput,
    ) -> Result<StoryRecord, ServiceError> {
        let current = load_owned_story(self.stories.as_ref(), story_id, principal).await?;

        let title = match input.title {
            Some(title) => normalize_title("title", &title)?,
            None => current.title.clone(),
        };
        let description = match input.description {
            Some(description) => normalize_optional(Some(description)),
            None => current.description.clone(),
        };
        let is_private = input.is_private.unwrap_or(current.is_private);
        let status = input.status.unwrap_or(current.status);

        let updated = self
            .stories
            .update_story(UpdateStoryParams {
                id: story_id,
                title,
                description,
                is_private,
                status,
            })
            .await
            .map_err(ServiceError::not_found_on_missing("story"))?;

        if updated.is_private != current.is_private {
            let chapter_ids: Vec<Uuid> = self
                .chapters
                .list_for_story(story_id)
                .await?
                .into_iter()
                .map(|chapter| chapter.id)
                .collect();
            self.cache
                .story_visibility_changed(story_id, &chapter_ids)
                .await?;
        } else {
            self.cache
                .story_changed(story_id, InvalidationMode::BestEffort)
                .await?;
        }

        if updated.status != current.status {
            self.activity.publish(ActivityEvent::StatusChange {
                story: updated.clone(),
                old_status: current.status,
            });
        }

        Ok(updated)
    }

    /// Chapters, comments, ratings and tag links go with the story.
    pub async fn delete_story(
        &self,
        principal: &Principal,
        story_id: Uuid,
    ) -> Result<(), ServiceError> {
        load_owned_story(self.stories.as_ref(), story_id, principal).await?;
        let chapter_ids: Vec<Uuid> = self
            .chapters
            .list_for_story(story_id)
            .await?
            .into_iter()
            .map(|chapter| chapter.id)
            .collect();

        if !self.stories.delete_story(story_id).await? {
            return Err(ServiceError::NotFound("story"));
        }
        self.cache.story_removed(story_id, &chapter_ids).await?;

        info!(target = "storytell::stories", story_id = %story_id, "story deleted");
        Ok(())
    }
}
