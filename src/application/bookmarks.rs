use std::sync::Arc;

use uuid::Uuid;

use crate::application::access::load_story;
use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::pagination::{PageRequest, Paginated};
use crate::application::repos::{BookmarkListItem, BookmarksRepo, StoriesRepo};
use crate::domain::entities::BookmarkRecord;

#[derive(Clone)]
pub struct BookmarkService {
    pub(crate) stories: Arc<dyn StoriesRepo>,
    pub(crate) bookmarks: Arc<dyn BookmarksRepo>,
}

impl BookmarkService {
    pub fn new(stories: Arc<dyn StoriesRepo>, bookmarks: Arc<dyn BookmarksRepo>) -> Self {
        Self { stories, bookmarks }
    }

    /// Stories the caller cannot see are reported as missing.
    pub async fn create_bookmark(
        &self,
        principal: &Principal,
        story_id: Uuid,
    ) -> Result<BookmarkRecord, ServiceError> {
        let story = load_story(self.stories.as_ref(), story_id).await?;
        if !story.visible_to(Some(principal.id)) {
            return Err(ServiceError::NotFound("story"));
        }
        self.bookmarks
            .create_bookmark(principal.id, story_id)
            .await
            .map_err(ServiceError::conflict_on_duplicate("story already bookmarked"))
    }

    pub async fn delete_bookmark(
        &self,
        principal: &Principal,
        story_id: Uuid,
    ) -> Result<(), ServiceError> {
        if self.bookmarks.delete_bookmark(principal.id, story_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("bookmark"))
        }
    }

    pub async fn list_bookmarks(
        &self,
        principal: &Principal,
        page: PageRequest,
    ) -> Result<Paginated<BookmarkListItem>, ServiceError> {
        Ok(self.bookmarks.list_for_user(principal.id, page).await?)
    }

    pub async fn bookmark_status(
        &self,
        principal: &Principal,
        story_id: Uuid,
    ) -> Result<bool, ServiceError> {
        Ok(self.bookmarks.bookmark_exists(principal.id, story_id).await?)
    }
}
