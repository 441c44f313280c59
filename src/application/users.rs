use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::application::auth::{Principal, hash_password};
use crate::application::error::ServiceError;
use crate::application::comments::thread_chapters;
use crate::application::repos::{
    ChaptersRepo, CommentsRepo, RatingsRepo, RepoError, StoriesRepo, UpdateUserParams, UsersRepo,
};
use crate::cache::{CacheTrigger, InvalidationMode};
use crate::domain::entities::UserProfile;
use crate::domain::validation::{normalize_username, validate_password};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    pub username: Option<String>,
    pub password: Option<String>,
    pub description: Option<String>,
    /// Ignored unless the caller is an admin.
    pub is_admin: Option<bool>,
}

/// Cached views a user write reaches, keyed by story with the chapter views under it.
#[derive(Debug, Default)]
struct AffectedViews {
    /// Stories the user authored; their views are dropped with the account.
    authored: BTreeMap<Uuid, Vec<Uuid>>,
    touched: BTreeMap<Uuid, Vec<Uuid>>,
}

impl AffectedViews {
    fn touch(&mut self, story_id: Uuid, chapter_ids: impl IntoIterator<Item = Uuid>) {
        if self.authored.contains_key(&story_id) {
            return;
        }
        let chapters = self.touched.entry(story_id).or_default();
        for chapter_id in chapter_ids {
            if !chapters.contains(&chapter_id) {
                chapters.push(chapter_id);
            }
        }
    }
}

#[derive(Clone)]
pub struct UserService {
    pub(crate) users: Arc<dyn UsersRepo>,
    pub(crate) stories: Arc<dyn StoriesRepo>,
    pub(crate) chapters: Arc<dyn ChaptersRepo>,
    pub(crate) comments: Arc<dyn CommentsRepo>,
    pub(crate) ratings: Arc<dyn RatingsRepo>,
    pub(crate) cache: CacheTrigger,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        stories: Arc<dyn StoriesRepo>,
        chapters: Arc<dyn ChaptersRepo>,
        comments: Arc<dyn CommentsRepo>,
        ratings: Arc<dyn RatingsRepo>,
        cache: CacheTrigger,
    ) -> Self {
        Self {
            users,
            stories,
            chapters,
            comments,
            ratings,
            cache,
        }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserProfile, ServiceError> {
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        Ok(UserProfile::from(&user))
    }

    pub async fn update_user(
        &self,
        principal: &Principal,
        user_id: Uuid,
        input: UpdateUserInput,
    ) -> Result<UserProfile, ServiceError> {
        ensure_self_or_admin(principal, user_id)?;
        let renaming = input.username.is_some();

        let username = input
            .username
            .as_deref()
            .map(normalize_username)
            .transpose()?;
        let password_hash = match input.password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let user = self
            .users
            .update_user(UpdateUserParams {
                id: user_id,
                username,
                password_hash,
                description: input.description.map(|description| description.trim().to_string()),
                is_admin: input.is_admin.filter(|_| principal.is_admin),
            })
            .await
            .map_err(|err| match err {
                RepoError::NotFound => ServiceError::NotFound("user"),
                other => ServiceError::conflict_on_duplicate("username already taken")(other),
            })?;

        if renaming {
            let affected = self.named_views(user_id).await?;
            for (story_id, chapter_ids) in affected.authored.iter().chain(&affected.touched) {
                self.cache
                    .views_changed(*story_id, chapter_ids, InvalidationMode::BestEffort)
                    .await?;
            }
        }
        Ok(UserProfile::from(&user))
    }

    /// Authored stories go with the account; views that listed the user's
    /// comments or ratings are rebuilt.
    pub async fn delete_user(&self, principal: &Principal, user_id: Uuid) -> Result<(), ServiceError> {
        ensure_self_or_admin(principal, user_id)?;
        let affected = self.cascaded_views(user_id).await?;
        if !self.users.delete_user(user_id).await? {
            return Err(ServiceError::NotFound("user"));
        }

        for (story_id, chapter_ids) in &affected.authored {
            self.cache.story_removed(*story_id, chapter_ids).await?;
        }
        for (story_id, chapter_ids) in &affected.touched {
            self.cache
                .views_changed(*story_id, chapter_ids, InvalidationMode::BestEffort)
                .await?;
        }
        Ok(())
    }

    /// Views that render the user's name: their story views and the views
    /// listing their comments.
    async fn named_views(&self, user_id: Uuid) -> Result<AffectedViews, ServiceError> {
        let mut affected = AffectedViews::default();
        for story in self.stories.list_by_author(user_id, true).await? {
            affected.touched.entry(story.id).or_default();
        }
        for comment in self.comments.list_by_author(user_id).await? {
            affected.touch(comment.story_id, comment.chapter_id);
        }
        Ok(affected)
    }

    /// Views the account's cascade reaches; collected before the delete.
    async fn cascaded_views(&self, user_id: Uuid) -> Result<AffectedViews, ServiceError> {
        let mut affected = AffectedViews::default();
        for story in self.stories.list_by_author(user_id, true).await? {
            let chapter_ids = self
                .chapters
                .list_for_story(story.id)
                .await?
                .into_iter()
                .map(|chapter| chapter.id)
                .collect();
            affected.authored.insert(story.id, chapter_ids);
        }
        for comment in self.comments.list_by_author(user_id).await? {
            let thread = self.comments.thread(comment.id).await?;
            affected.touch(comment.story_id, thread_chapters(&thread));
        }
        for rating in self.ratings.list_by_author(user_id).await? {
            affected.touch(rating.story_id, None);
        }
        Ok(affected)
    }
}

fn ensure_self_or_admin(principal: &Principal, user_id: Uuid) -> Result<(), ServiceError> {
    if principal.id == user_id || principal.is_admin {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("only the account owner or an admin may do this"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authored_stories_absorb_touches() {
        let authored = Uuid::new_v4();
        let other = Uuid::new_v4();
        let chapter = Uuid::new_v4();
        let mut affected = AffectedViews::default();
        affected.authored.insert(authored, Vec::new());

        affected.touch(authored, [chapter]);
        affected.touch(other, [chapter]);
        affected.touch(other, [chapter]);
        affected.touch(other, None);

        assert!(affected.authored[&authored].is_empty());
        assert_eq!(affected.touched.len(), 1);
        assert_eq!(affected.touched[&other], vec![chapter]);
    }
}
