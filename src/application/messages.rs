//! Direct messages between users.
//!
//! Deletion is per participant: each side hides the message independently.

use std::sync::Arc;

use uuid::Uuid;

use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::pagination::{PageRequest, Paginated};
use crate::application::repos::{ConversationSummary, MessagesRepo, UsersRepo};
use crate::domain::entities::MessageRecord;
use crate::domain::validation::validate_content;

#[derive(Clone)]
pub struct MessageService {
    pub(crate) users: Arc<dyn UsersRepo>,
    pub(crate) messages: Arc<dyn MessagesRepo>,
}

impl MessageService {
    pub fn new(users: Arc<dyn UsersRepo>, messages: Arc<dyn MessagesRepo>) -> Self {
        Self { users, messages }
    }

    pub async fn send_message(
        &self,
        principal: &Principal,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<MessageRecord, ServiceError> {
        if receiver_id == principal.id {
            return Err(ServiceError::bad_request("cannot message yourself"));
        }
        validate_content("content", content)?;
        self.users
            .find_user(receiver_id)
            .await?
            .ok_or(ServiceError::NotFound("receiver"))?;

        Ok(self
            .messages
            .send_message(principal.id, receiver_id, content.trim())
            .await?)
    }

    pub async fn conversations(
        &self,
        principal: &Principal,
    ) -> Result<Vec<ConversationSummary>, ServiceError> {
        Ok(self.messages.list_conversations(principal.id).await?)
    }

    pub async fn history(
        &self,
        principal: &Principal,
        other_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<MessageRecord>, ServiceError> {
        Ok(self.messages.history(principal.id, other_id, page).await?)
    }

    /// Returns how many messages were newly marked.
    pub async fn mark_read(&self, principal: &Principal, other_id: Uuid) -> Result<u64, ServiceError> {
        Ok(self.messages.mark_read(principal.id, other_id).await?)
    }

    pub async fn delete_message(
        &self,
        principal: &Principal,
        message_id: Uuid,
    ) -> Result<(), ServiceError> {
        let message = self
            .messages
            .find_message(message_id)
            .await?
            .ok_or(ServiceError::NotFound("message"))?;
        if message.sender_id != principal.id && message.receiver_id != principal.id {
            return Err(ServiceError::NotFound("message"));
        }
        if self.messages.soft_delete(message_id, principal.id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("message"))
        }
    }

    pub async fn unread_count(&self, principal: &Principal) -> Result<u64, ServiceError> {
        Ok(self.messages.unread_count(principal.id).await?)
    }
}
