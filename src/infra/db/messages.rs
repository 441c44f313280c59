use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{ConversationSummary, MessagesRepo, RepoError},
    domain::entities::MessageRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, is_read, deleted_by_sender, deleted_by_receiver, created_at";

// Messages not hidden from `$1`.
const VISIBLE_TO_USER: &str = "((sender_id = $1 AND NOT deleted_by_sender) \
     OR (receiver_id = $1 AND NOT deleted_by_receiver))";

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    is_read: bool,
    deleted_by_sender: bool,
    deleted_by_receiver: bool,
    created_at: OffsetDateTime,
}

impl From<MessageRow> for MessageRecord {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            is_read: row.is_read,
            deleted_by_sender: row.deleted_by_sender,
            deleted_by_receiver: row.deleted_by_receiver,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    #[sqlx(flatten)]
    message: MessageRow,
    other_user_id: Uuid,
    other_username: String,
    unread_count: i64,
}

#[async_trait]
impl MessagesRepo for PostgresRepositories {
    async fn send_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<MessageRecord, RepoError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages (id, sender_id, receiver_id, content) VALUES ($1, $2, $3, $4) \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(sender_id)
        .bind(receiver_id)
        .bind(content)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<MessageRecord>, RepoError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(MessageRecord::from))
    }

    async fn list_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, RepoError> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            r#"
            WITH visible AS (
                SELECT {MESSAGE_COLUMNS},
                       CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END AS other_user_id
                FROM messages
                WHERE {VISIBLE_TO_USER}
            ),
            latest AS (
                SELECT DISTINCT ON (other_user_id) *
                FROM visible
                ORDER BY other_user_id, created_at DESC, id DESC
            )
            SELECT l.id, l.sender_id, l.receiver_id, l.content, l.is_read,
                   l.deleted_by_sender, l.deleted_by_receiver, l.created_at,
                   l.other_user_id,
                   u.username AS other_username,
                   (
                       SELECT COUNT(*) FROM visible v
                       WHERE v.other_user_id = l.other_user_id
                         AND v.receiver_id = $1
                         AND NOT v.is_read
                   ) AS unread_count
            FROM latest l
            INNER JOIN users u ON u.id = l.other_user_id
            ORDER BY l.created_at DESC, l.id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| ConversationSummary {
                other_user_id: row.other_user_id,
                other_username: row.other_username,
                last_message: row.message.into(),
                unread_count: row.unread_count,
            })
            .collect())
    }

    async fn history(
        &self,
        user_id: Uuid,
        other_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<MessageRecord>, RepoError> {
        let pair = "((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM messages WHERE {pair} AND {VISIBLE_TO_USER}"
        ))
        .bind(user_id)
        .bind(other_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {pair} AND {VISIBLE_TO_USER} \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(user_id)
        .bind(other_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(MessageRecord::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }

    async fn mark_read(&self, user_id: Uuid, other_id: Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE \
             WHERE receiver_id = $1 AND sender_id = $2 AND NOT is_read",
        )
        .bind(user_id)
        .bind(other_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn soft_delete(&self, id: Uuid, user_id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE messages SET \
                 deleted_by_sender = deleted_by_sender OR sender_id = $2, \
                 deleted_by_receiver = deleted_by_receiver OR receiver_id = $2 \
             WHERE id = $1 AND (sender_id = $2 OR receiver_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE receiver_id = $1 AND NOT is_read AND NOT deleted_by_receiver",
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Self::convert_count(total)
    }
}
