use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::application::access::load_visible_story;
use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::pagination::{PageRequest, Paginated};
use crate::application::read_model::CommentView;
use crate::application::repos::{
    ChaptersRepo, CommentWithAuthor, CommentsRepo, CreateCommentParams, StoriesRepo,
};
use crate::cache::{CacheTrigger, InvalidationMode};
use crate::domain::entities::CommentRecord;
use crate::domain::validation::validate_content;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentInput {
    pub story_id: Uuid,
    pub chapter_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub content: String,
}

#[derive(Clone)]
pub struct CommentService {
    pub(crate) stories: Arc<dyn StoriesRepo>,
    pub(crate) chapters: Arc<dyn ChaptersRepo>,
    pub(crate) comments: Arc<dyn CommentsRepo>,
    pub(crate) cache: CacheTrigger,
}

impl CommentService {
    pub fn new(
        stories: Arc<dyn StoriesRepo>,
        chapters: Arc<dyn ChaptersRepo>,
        comments: Arc<dyn CommentsRepo>,
        cache: CacheTrigger,
    ) -> Self {
        Self {
            stories,
            chapters,
            comments,
            cache,
        }
    }

    /// Chapter and parent, when given, must belong to the same story, and a
    /// reply sits on its parent's chapter.
    pub async fn create_comment(
        &self,
        principal: &Principal,
        input: CreateCommentInput,
    ) -> Result<CommentRecord, ServiceError> {
        validate_content("content", &input.content)?;
        let story =
            load_visible_story(self.stories.as_ref(), input.story_id, Some(principal.id)).await?;

        if let Some(chapter_id) = input.chapter_id {
            let chapter = self
                .chapters
                .find_chapter(chapter_id)
                .await?
                .ok_or(ServiceError::NotFound("chapter"))?;
            if chapter.story_id != story.id {
                return Err(ServiceError::bad_request(
                    "chapter does not belong to the story",
                ));
            }
        }
        if let Some(parent_id) = input.parent_id {
            let parent = self
                .comments
                .find_comment(parent_id)
                .await?
                .ok_or(ServiceError::NotFound("parent comment"))?;
            if parent.story_id != story.id {
                return Err(ServiceError::bad_request(
                    "parent comment does not belong to the story",
                ));
            }
            if parent.chapter_id != input.chapter_id {
                return Err(ServiceError::bad_request(
                    "reply must be on the same chapter as its parent",
                ));
            }
        }

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                story_id: story.id,
                chapter_id: input.chapter_id,
                parent_id: input.parent_id,
                author_id: principal.id,
                content: input.content.trim().to_string(),
            })
            .await?;

        self.invalidate_for(&comment).await?;
        Ok(comment)
    }

    pub async fn list_story_comments(
        &self,
        viewer: Option<Uuid>,
        story_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<CommentView>, ServiceError> {
        load_visible_story(self.stories.as_ref(), story_id, viewer).await?;
        Ok(self
            .comments
            .list_for_story(story_id, page)
            .await?
            .map(CommentView::from))
    }

    pub async fn list_chapter_comments(
        &self,
        viewer: Option<Uuid>,
        chapter_id: Uuid,
    ) -> Result<Vec<CommentView>, ServiceError> {
        let chapter = self
            .chapters
            .find_chapter(chapter_id)
            .await?
            .ok_or(ServiceError::NotFound("chapter"))?;
        load_visible_story(self.stories.as_ref(), chapter.story_id, viewer).await?;
        Ok(self
            .comments
            .list_for_chapter(chapter_id)
            .await?
            .into_iter()
            .map(CommentView::from)
            .collect())
    }

    /// The comment followed by its whole reply subtree.
    pub async fn comment_thread(
        &self,
        viewer: Option<Uuid>,
        comment_id: Uuid,
    ) -> Result<Vec<CommentView>, ServiceError> {
        let root = self.load_comment(comment_id).await?;
        load_visible_story(self.stories.as_ref(), root.story_id, viewer).await?;
        Ok(self
            .comments
            .thread(comment_id)
            .await?
            .into_iter()
            .map(CommentView::from)
            .collect())
    }

    pub async fn update_comment(
        &self,
        principal: &Principal,
        comment_id: Uuid,
        content: &str,
    ) -> Result<CommentRecord, ServiceError> {
        validate_content("content", content)?;
        let comment = self.load_comment(comment_id).await?;
        if comment.author_id != principal.id {
            return Err(ServiceError::Forbidden("only the author may edit this comment"));
        }

        let updated = self
            .comments
            .update_comment(comment_id, content.trim())
            .await
            .map_err(ServiceError::not_found_on_missing("comment"))?;
        self.invalidate_for(&updated).await?;
        Ok(updated)
    }

    /// Replies are removed with their parent, so every chapter the subtree
    /// touches is invalidated.
    pub async fn delete_comment(
        &self,
        principal: &Principal,
        comment_id: Uuid,
    ) -> Result<(), ServiceError> {
        let comment = self.load_comment(comment_id).await?;
        if comment.author_id != principal.id {
            return Err(ServiceError::Forbidden("only the author may delete this comment"));
        }
        let chapter_ids = thread_chapters(&self.comments.thread(comment_id).await?);
        if !self.comments.delete_comment(comment_id).await? {
            return Err(ServiceError::NotFound("comment"));
        }
        self.cache
            .views_changed(comment.story_id, &chapter_ids, InvalidationMode::BestEffort)
            .await?;
        Ok(())
    }

    async fn load_comment(&self, comment_id: Uuid) -> Result<CommentRecord, ServiceError> {
        self.comments
            .find_comment(comment_id)
            .await?
            .ok_or(ServiceError::NotFound("comment"))
    }

    async fn invalidate_for(&self, comment: &CommentRecord) -> Result<(), ServiceError> {
        match comment.chapter_id {
            Some(chapter_id) => {
                self.cache
                    .chapter_changed(comment.story_id, chapter_id, InvalidationMode::BestEffort)
                    .await?
            }
            None => {
                self.cache
                    .story_changed(comment.story_id, InvalidationMode::BestEffort)
                    .await?
            }
        }
        Ok(())
    }
}

/// Distinct chapters a comment subtree is attached to, in first-seen order.
pub(crate) fn thread_chapters(thread: &[CommentWithAuthor]) -> Vec<Uuid> {
    let mut chapters = Vec::new();
    for chapter_id in thread.iter().filter_map(|row| row.comment.chapter_id) {
        if !chapters.contains(&chapter_id) {
            chapters.push(chapter_id);
        }
    }
    chapters
}
