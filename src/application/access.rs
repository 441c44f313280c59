//! Ownership and visibility checks shared by the services.

use uuid::Uuid;

use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::repos::StoriesRepo;
use crate::domain::entities::StoryRecord;

/// Rejection for a private aggregate: anonymous callers get 401, others 403.
pub(crate) fn private_denied(viewer: Option<Uuid>) -> ServiceError {
    match viewer {
        None => ServiceError::Unauthorized("story is private"),
        Some(_) => ServiceError::Forbidden("story is private"),
    }
}

pub(crate) async fn load_story(
    stories: &dyn StoriesRepo,
    story_id: Uuid,
) -> Result<StoryRecord, ServiceError> {
    stories
        .find_story(story_id)
        .await?
        .ok_or(ServiceError::NotFound("story"))
}

/// Load a story the viewer may see.
pub(crate) async fn load_visible_story(
    stories: &dyn StoriesRepo,
    story_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<StoryRecord, ServiceError> {
    let story = load_story(stories, story_id).await?;
    if !story.visible_to(viewer) {
        return Err(private_denied(viewer));
    }
    Ok(story)
}

/// Load a story the principal authored.
pub(crate) async fn load_owned_story(
    stories: &dyn StoriesRepo,
    story_id: Uuid,
    principal: &Principal,
) -> Result<StoryRecord, ServiceError> {
    let story = load_story(stories, story_id).await?;
    if story.author_id != principal.id {
        return Err(ServiceError::Forbidden("only the author may modify this story"));
    }
    Ok(story)
}

pub(crate) fn require_admin(principal: &Principal) -> Result<(), ServiceError> {
    if principal.is_admin {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("admin only"))
    }
}
