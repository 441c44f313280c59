use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{ChaptersRepo, CreateChapterParams, RepoError, UpdateChapterParams},
    domain::entities::ChapterRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const CHAPTER_COLUMNS: &str = r#"id, title, content, story_id, "order", created_at"#;

#[derive(sqlx::FromRow)]
struct ChapterRow {
    id: Uuid,
    title: String,
    content: String,
    story_id: Uuid,
    order: i32,
    created_at: OffsetDateTime,
}

impl From<ChapterRow> for ChapterRecord {
    fn from(row: ChapterRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            story_id: row.story_id,
            order: row.order,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ChaptersRepo for PostgresRepositories {
    async fn create_chapter(&self, params: CreateChapterParams) -> Result<ChapterRecord, RepoError> {
        let row = sqlx::query_as::<_, ChapterRow>(&format!(
            r#"
            INSERT INTO chapters (id, title, content, story_id, "order")
            VALUES (
                $1, $2, $3, $4,
                COALESCE($5, (SELECT COALESCE(MAX("order"), 0) + 1 FROM chapters WHERE story_id = $4))
            )
            RETURNING {CHAPTER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&params.title)
        .bind(&params.content)
        .bind(params.story_id)
        .bind(params.order)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_chapter(&self, id: Uuid) -> Result<Option<ChapterRecord>, RepoError> {
        let row = sqlx::query_as::<_, ChapterRow>(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ChapterRecord::from))
    }

    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<ChapterRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ChapterRow>(&format!(
            r#"SELECT {CHAPTER_COLUMNS} FROM chapters WHERE story_id = $1 ORDER BY "order" ASC, created_at ASC"#
        ))
        .bind(story_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ChapterRecord::from).collect())
    }

    async fn update_chapter(&self, params: UpdateChapterParams) -> Result<ChapterRecord, RepoError> {
        let row = sqlx::query_as::<_, ChapterRow>(&format!(
            r#"
            UPDATE chapters SET title = $2, content = $3, "order" = $4
            WHERE id = $1
            RETURNING {CHAPTER_COLUMNS}
            "#
        ))
        .bind(params.id)
        .bind(&params.title)
        .bind(&params.content)
        .bind(params.order)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ChapterRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_chapter(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM chapters WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all_chapters(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<ChapterRecord>, RepoError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chapters")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, ChapterRow>(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(ChapterRecord::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }
}
