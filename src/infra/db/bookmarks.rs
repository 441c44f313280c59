use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{BookmarkListItem, BookmarksRepo, LatestChapter, RepoError},
    domain::entities::BookmarkRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct BookmarkRow {
    id: Uuid,
    user_id: Uuid,
    story_id: Uuid,
    created_at: OffsetDateTime,
}

impl From<BookmarkRow> for BookmarkRecord {
    fn from(row: BookmarkRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            story_id: row.story_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookmarkListRow {
    #[sqlx(flatten)]
    bookmark: BookmarkRow,
    story_title: String,
    story_author_id: Uuid,
    latest_chapter_id: Option<Uuid>,
    latest_chapter_title: Option<String>,
    latest_chapter_order: Option<i32>,
}

impl From<BookmarkListRow> for BookmarkListItem {
    fn from(row: BookmarkListRow) -> Self {
        let latest_chapter = match (
            row.latest_chapter_id,
            row.latest_chapter_title,
            row.latest_chapter_order,
        ) {
            (Some(id), Some(title), Some(order)) => Some(LatestChapter { id, title, order }),
            _ => None,
        };

        Self {
            bookmark: row.bookmark.into(),
            story_title: row.story_title,
            story_author_id: row.story_author_id,
            latest_chapter,
        }
    }
}

#[async_trait]
impl BookmarksRepo for PostgresRepositories {
    async fn create_bookmark(
        &self,
        user_id: Uuid,
        story_id: Uuid,
    ) -> Result<BookmarkRecord, RepoError> {
        let row = sqlx::query_as::<_, BookmarkRow>(
            "INSERT INTO bookmarks (id, user_id, story_id) VALUES ($1, $2, $3) \
             RETURNING id, user_id, story_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(story_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn delete_bookmark(&self, user_id: Uuid, story_id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND story_id = $2")
            .bind(user_id)
            .bind(story_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn bookmark_exists(&self, user_id: Uuid, story_id: Uuid) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM bookmarks WHERE user_id = $1 AND story_id = $2)",
        )
        .bind(user_id)
        .bind(story_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<BookmarkListItem>, RepoError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookmarks WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, BookmarkListRow>(
            r#"
            SELECT b.id, b.user_id, b.story_id, b.created_at,
                   s.title AS story_title,
                   s.author_id AS story_author_id,
                   lc.id AS latest_chapter_id,
                   lc.title AS latest_chapter_title,
                   lc."order" AS latest_chapter_order
            FROM bookmarks b
            INNER JOIN stories s ON s.id = b.story_id
            LEFT JOIN LATERAL (
                SELECT c.id, c.title, c."order"
                FROM chapters c
                WHERE c.story_id = s.id
                ORDER BY c."order" DESC, c.created_at DESC
                LIMIT 1
            ) lc ON TRUE
            WHERE b.user_id = $1
            ORDER BY b.created_at DESC, b.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(BookmarkListItem::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }
}
