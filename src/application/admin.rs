//! Admin-only listings across every author.

use std::sync::Arc;

use crate::application::access::require_admin;
use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::pagination::{PageRequest, Paginated};
use crate::application::repos::{ChaptersRepo, CommentsRepo, StoriesRepo, UsersRepo};
use crate::domain::entities::{ChapterRecord, CommentRecord, StoryRecord, UserProfile};

#[derive(Clone)]
pub struct AdminService {
    pub(crate) users: Arc<dyn UsersRepo>,
    pub(crate) stories: Arc<dyn StoriesRepo>,
    pub(crate) chapters: Arc<dyn ChaptersRepo>,
    pub(crate) comments: Arc<dyn CommentsRepo>,
}

impl AdminService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        stories: Arc<dyn StoriesRepo>,
        chapters: Arc<dyn ChaptersRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            users,
            stories,
            chapters,
            comments,
        }
    }

    pub async fn list_users(
        &self,
        principal: &Principal,
        page: PageRequest,
    ) -> Result<Paginated<UserProfile>, ServiceError> {
        require_admin(principal)?;
        Ok(self
            .users
            .list_users(page)
            .await?
            .map(|user| UserProfile::from(&user)))
    }

    /// Includes private stories.
    pub async fn list_stories(
        &self,
        principal: &Principal,
        page: PageRequest,
    ) -> Result<Paginated<StoryRecord>, ServiceError> {
        require_admin(principal)?;
        Ok(self.stories.list_all_stories(page).await?)
    }

    pub async fn list_chapters(
        &self,
        principal: &Principal,
        page: PageRequest,
    ) -> Result<Paginated<ChapterRecord>, ServiceError> {
        require_admin(principal)?;
        Ok(self.chapters.list_all_chapters(page).await?)
    }

    pub async fn list_comments(
        &self,
        principal: &Principal,
        page: PageRequest,
    ) -> Result<Paginated<CommentRecord>, ServiceError> {
        require_admin(principal)?;
        Ok(self.comments.list_all_comments(page).await?)
    }
}
