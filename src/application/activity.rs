//! Activity fan-out for followers.
//!
//! Qualifying story and chapter writes publish an event here. Publishing is
//! fire-and-forget: entries are appended from a detached task and any
//! failure is logged and counted, never surfaced to the triggering request.

use std::sync::Arc;

use metrics::counter;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::error::ServiceError;
use crate::application::pagination::{PageRequest, Paginated};
use crate::application::repos::{ActivityRepo, FeedItem, NewActivity, RepoError};
use crate::domain::entities::{ActivityRecord, ChapterRecord, StoryRecord};
use crate::domain::types::{ActivityType, StoryStatus};

pub(crate) const METRIC_ACTIVITY_FAILED_TOTAL: &str = "storytell_activity_failed_total";

/// A write that followers may want to hear about.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    NewStory {
        story: StoryRecord,
    },
    NewChapter {
        story: StoryRecord,
        chapter: ChapterRecord,
    },
    StatusChange {
        story: StoryRecord,
        old_status: StoryStatus,
    },
}

impl ActivityEvent {
    fn story(&self) -> &StoryRecord {
        match self {
            ActivityEvent::NewStory { story }
            | ActivityEvent::NewChapter { story, .. }
            | ActivityEvent::StatusChange { story, .. } => story,
        }
    }

    fn into_activity(self) -> NewActivity {
        match self {
            ActivityEvent::NewStory { story } => NewActivity {
                user_id: story.author_id,
                activity_type: ActivityType::NewStory,
                story_id: Some(story.id),
                chapter_id: None,
                metadata: Some(json!({ "title": story.title })),
            },
            ActivityEvent::NewChapter { story, chapter } => NewActivity {
                user_id: story.author_id,
                activity_type: ActivityType::NewChapter,
                story_id: Some(story.id),
                chapter_id: Some(chapter.id),
                metadata: Some(json!({
                    "storyTitle": story.title,
                    "chapterTitle": chapter.title,
                    "order": chapter.order,
                })),
            },
            ActivityEvent::StatusChange { story, old_status } => NewActivity {
                user_id: story.author_id,
                activity_type: ActivityType::StatusChange,
                story_id: Some(story.id),
                chapter_id: None,
                metadata: Some(json!({
                    "title": story.title,
                    "oldStatus": old_status.as_str(),
                    "newStatus": story.status.as_str(),
                })),
            },
        }
    }
}

#[derive(Clone)]
pub struct ActivityService {
    pub(crate) repo: Arc<dyn ActivityRepo>,
}

impl ActivityService {
    pub fn new(repo: Arc<dyn ActivityRepo>) -> Self {
        Self { repo }
    }

    /// Append one entry. Errors propagate to the caller.
    pub async fn create_activity(
        &self,
        user_id: Uuid,
        activity_type: ActivityType,
        story_id: Option<Uuid>,
        chapter_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
    ) -> Result<ActivityRecord, RepoError> {
        self.repo
            .append_activity(NewActivity {
                user_id,
                activity_type,
                story_id,
                chapter_id,
                metadata,
            })
            .await
    }

    /// Publish without waiting. Private stories never produce entries.
    pub fn publish(&self, event: ActivityEvent) -> Option<JoinHandle<()>> {
        if event.story().is_private {
            debug!(
                target = "storytell::activity",
                story_id = %event.story().id,
                "activity suppressed for private story"
            );
            return None;
        }

        let activity = event.into_activity();
        let service = self.clone();
        Some(tokio::spawn(async move {
            let activity_type = activity.activity_type;
            let story_id = activity.story_id;
            let result = service
                .create_activity(
                    activity.user_id,
                    activity.activity_type,
                    activity.story_id,
                    activity.chapter_id,
                    activity.metadata,
                )
                .await;
            if let Err(err) = result {
                counter!(METRIC_ACTIVITY_FAILED_TOTAL, "activity_type" => activity_type.as_str())
                    .increment(1);
                warn!(
                    target = "storytell::activity",
                    activity_type = activity_type.as_str(),
                    story_id = ?story_id,
                    error = %err,
                    "activity fan-out failed"
                );
            }
        }))
    }

    /// Entries from followed users, newest first.
    pub async fn feed(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FeedItem>, ServiceError> {
        Ok(self.repo.feed_for_follower(user_id, page).await?)
    }
}
