//! Directed follow edges between users.
//!
//! The feed query in [`crate::application::activity`] joins against these
//! edges; nothing here is cached.

use std::sync::Arc;

use uuid::Uuid;

use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::pagination::{PageRequest, Paginated};
use crate::application::repos::{FollowStats, FollowUser, FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::FollowRecord;

#[derive(Clone)]
pub struct FollowService {
    pub(crate) users: Arc<dyn UsersRepo>,
    pub(crate) follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        principal: &Principal,
        target_id: Uuid,
    ) -> Result<FollowRecord, ServiceError> {
        if principal.id == target_id {
            return Err(ServiceError::bad_request("users cannot follow themselves"));
        }
        self.ensure_user(target_id).await?;

        // The target may be deleted between the check and the insert.
        self.follows
            .create_follow(principal.id, target_id)
            .await
            .map_err(|err| match err {
                RepoError::InvalidInput { .. } => ServiceError::NotFound("user"),
                other => ServiceError::conflict_on_duplicate("already following")(other),
            })
    }

    pub async fn unfollow(&self, principal: &Principal, target_id: Uuid) -> Result<(), ServiceError> {
        if self.follows.delete_follow(principal.id, target_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("follow"))
        }
    }

    pub async fn followers(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FollowUser>, ServiceError> {
        self.ensure_user(user_id).await?;
        Ok(self.follows.list_followers(user_id, page).await?)
    }

    pub async fn following(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FollowUser>, ServiceError> {
        self.ensure_user(user_id).await?;
        Ok(self.follows.list_following(user_id, page).await?)
    }

    pub async fn is_following(
        &self,
        principal: &Principal,
        target_id: Uuid,
    ) -> Result<bool, ServiceError> {
        Ok(self.follows.follow_exists(principal.id, target_id).await?)
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<FollowStats, ServiceError> {
        self.ensure_user(user_id).await?;
        Ok(self.follows.follow_stats(user_id).await?)
    }

    async fn ensure_user(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.users
            .find_user(user_id)
            .await?
            .map(|_| ())
            .ok_or(ServiceError::NotFound("user"))
    }
}
