//! Reading progress. Entries are written by the story and chapter read paths.

use std::sync::Arc;

use uuid::Uuid;

use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::repos::{ReadHistoryItem, ReadHistoryRepo};

#[derive(Clone)]
pub struct ReadHistoryService {
    pub(crate) read_history: Arc<dyn ReadHistoryRepo>,
}

impl ReadHistoryService {
    pub fn new(read_history: Arc<dyn ReadHistoryRepo>) -> Self {
        Self { read_history }
    }

    /// Most recently read first.
    pub async fn list_history(
        &self,
        principal: &Principal,
    ) -> Result<Vec<ReadHistoryItem>, ServiceError> {
        let mut items = self.read_history.list_for_user(principal.id).await?;
        items.sort_by(|a, b| b.record.read_at.cmp(&a.record.read_at));
        Ok(items)
    }

    pub async fn story_history(
        &self,
        principal: &Principal,
        story_id: Uuid,
    ) -> Result<Option<ReadHistoryItem>, ServiceError> {
        Ok(self
            .read_history
            .find_for_story(principal.id, story_id)
            .await?)
    }
}
