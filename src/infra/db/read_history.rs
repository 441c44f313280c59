use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ReadHistoryItem, ReadHistoryRepo, RepoError},
    domain::entities::ReadHistoryRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const HISTORY_ITEM_SELECT: &str = r#"
    SELECT h.id, h.user_id, h.story_id, h.chapter_id, h.read_at,
           s.title AS story_title,
           c.title AS chapter_title,
           c."order" AS chapter_order
    FROM read_history h
    LEFT JOIN stories s ON s.id = h.story_id
    LEFT JOIN chapters c ON c.id = h.chapter_id
"#;

#[derive(sqlx::FromRow)]
struct ReadHistoryRow {
    id: Uuid,
    user_id: Uuid,
    story_id: Uuid,
    chapter_id: Option<Uuid>,
    read_at: OffsetDateTime,
}

impl From<ReadHistoryRow> for ReadHistoryRecord {
    fn from(row: ReadHistoryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            story_id: row.story_id,
            chapter_id: row.chapter_id,
            read_at: row.read_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReadHistoryItemRow {
    #[sqlx(flatten)]
    record: ReadHistoryRow,
    story_title: Option<String>,
    chapter_title: Option<String>,
    chapter_order: Option<i32>,
}

impl From<ReadHistoryItemRow> for ReadHistoryItem {
    fn from(row: ReadHistoryItemRow) -> Self {
        Self {
            record: row.record.into(),
            story_title: row.story_title,
            chapter_title: row.chapter_title,
            chapter_order: row.chapter_order,
        }
    }
}

#[async_trait]
impl ReadHistoryRepo for PostgresRepositories {
    async fn record_read(
        &self,
        user_id: Uuid,
        story_id: Uuid,
        chapter_id: Option<Uuid>,
    ) -> Result<ReadHistoryRecord, RepoError> {
        let row = sqlx::query_as::<_, ReadHistoryRow>(
            r#"
            INSERT INTO read_history (id, user_id, story_id, chapter_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (story_id, user_id) DO UPDATE
            SET read_at = now(),
                chapter_id = COALESCE(EXCLUDED.chapter_id, read_history.chapter_id)
            RETURNING id, user_id, story_id, chapter_id, read_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(story_id)
        .bind(chapter_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ReadHistoryItem>, RepoError> {
        let rows = sqlx::query_as::<_, ReadHistoryItemRow>(&format!(
            "{HISTORY_ITEM_SELECT} WHERE h.user_id = $1 ORDER BY h.read_at DESC, h.id DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ReadHistoryItem::from).collect())
    }

    async fn find_for_story(
        &self,
        user_id: Uuid,
        story_id: Uuid,
    ) -> Result<Option<ReadHistoryItem>, RepoError> {
        let row = sqlx::query_as::<_, ReadHistoryItemRow>(&format!(
            "{HISTORY_ITEM_SELECT} WHERE h.user_id = $1 AND h.story_id = $2"
        ))
        .bind(user_id)
        .bind(story_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ReadHistoryItem::from))
    }
}
