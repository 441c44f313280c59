use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::application::access::{load_owned_story, load_visible_story, require_admin};
use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::repos::{RepoError, StoriesRepo, TagQueryFilter, TagsRepo};
use crate::cache::{CacheTrigger, InvalidationMode};
use crate::domain::entities::TagRecord;
use crate::domain::validation::{normalize_optional, normalize_title};

#[derive(Clone)]
pub struct TagService {
    pub(crate) stories: Arc<dyn StoriesRepo>,
    pub(crate) tags: Arc<dyn TagsRepo>,
    pub(crate) cache: CacheTrigger,
}

impl TagService {
    pub fn new(stories: Arc<dyn StoriesRepo>, tags: Arc<dyn TagsRepo>, cache: CacheTrigger) -> Self {
        Self {
            stories,
            tags,
            cache,
        }
    }

    pub async fn create_tag(
        &self,
        name: &str,
        category: Option<String>,
    ) -> Result<TagRecord, ServiceError> {
        let name = normalize_title("name", name)?;
        let category = normalize_optional(category);
        self.tags
            .create_tag(&name, category.as_deref())
            .await
            .map_err(ServiceError::conflict_on_duplicate("tag name already exists"))
    }

    pub async fn list_tags(&self, mut filter: TagQueryFilter) -> Result<Vec<TagRecord>, ServiceError> {
        filter.search = normalize_optional(filter.search);
        filter.category = normalize_optional(filter.category);
        Ok(self.tags.list_tags(&filter).await?)
    }

    pub async fn list_categories(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.tags.list_categories().await?)
    }

    pub async fn story_tags(
        &self,
        viewer: Option<Uuid>,
        story_id: Uuid,
    ) -> Result<Vec<TagRecord>, ServiceError> {
        load_visible_story(self.stories.as_ref(), story_id, viewer).await?;
        Ok(self.tags.list_for_story(story_id).await?)
    }

    /// Replace the story's tag set.
    pub async fn assign_tags(
        &self,
        principal: &Principal,
        story_id: Uuid,
        tag_ids: Vec<Uuid>,
    ) -> Result<Vec<TagRecord>, ServiceError> {
        if tag_ids.is_empty() {
            return Err(ServiceError::bad_request("tagIds must not be empty"));
        }
        load_owned_story(self.stories.as_ref(), story_id, principal).await?;

        let mut seen = HashSet::new();
        let tag_ids: Vec<Uuid> = tag_ids.into_iter().filter(|id| seen.insert(*id)).collect();
        let found = self.tags.find_tags(&tag_ids).await?;
        if found.len() != tag_ids.len() {
            return Err(ServiceError::NotFound("tag"));
        }

        self.tags.replace_story_tags(story_id, &tag_ids).await?;
        self.cache
            .story_changed(story_id, InvalidationMode::BestEffort)
            .await?;
        Ok(self.tags.list_for_story(story_id).await?)
    }

    pub async fn remove_tag(
        &self,
        principal: &Principal,
        story_id: Uuid,
        tag_id: Uuid,
    ) -> Result<(), ServiceError> {
        load_owned_story(self.stories.as_ref(), story_id, principal).await?;
        if !self.tags.remove_story_tag(story_id, tag_id).await? {
            return Err(ServiceError::NotFound("story tag"));
        }
        self.cache
            .story_changed(story_id, InvalidationMode::BestEffort)
            .await?;
        Ok(())
    }

    /// Returns how many tag links were removed.
    pub async fn clear_tags(&self, principal: &Principal, story_id: Uuid) -> Result<u64, ServiceError> {
        load_owned_story(self.stories.as_ref(), story_id, principal).await?;
        let removed = self.tags.clear_story_tags(story_id).await?;
        if removed > 0 {
            self.cache
                .story_changed(story_id, InvalidationMode::BestEffort)
                .await?;
        }
        Ok(removed)
    }

    pub async fn update_tag(
        &self,
        principal: &Principal,
        tag_id: Uuid,
        name: &str,
        category: Option<String>,
    ) -> Result<TagRecord, ServiceError> {
        require_admin(principal)?;
        let name = normalize_title("name", name)?;
        let category = normalize_optional(category);

        let tag = self
            .tags
            .update_tag(tag_id, &name, category.as_deref())
            .await
            .map_err(|err| match err {
                RepoError::NotFound => ServiceError::NotFound("tag"),
                other => ServiceError::conflict_on_duplicate("tag name already exists")(other),
            })?;

        for story_id in self.tags.stories_with_tag(tag_id).await? {
            self.cache
                .story_changed(story_id, InvalidationMode::BestEffort)
                .await?;
        }
        Ok(tag)
    }

    pub async fn delete_tag(&self, principal: &Principal, tag_id: Uuid) -> Result<(), ServiceError> {
        require_admin(principal)?;
        let affected = self.tags.stories_with_tag(tag_id).await?;
        if !self.tags.delete_tag(tag_id).await? {
            return Err(ServiceError::NotFound("tag"));
        }
        for story_id in affected {
            self.cache
                .story_changed(story_id, InvalidationMode::BestEffort)
                .await?;
        }
        Ok(())
    }
}
