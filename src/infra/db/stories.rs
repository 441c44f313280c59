use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{
        CreateStoryParams, RepoError, StoriesRepo, StoryListItem, StoryQueryFilter,
        StoryWithAuthor, UpdateStoryParams,
    },
    domain::{entities::StoryRecord, types::StoryStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const STORY_COLUMNS: &str = "s.id, s.title, s.description, s.author_id, s.is_private, s.status, s.created_at";

#[derive(sqlx::FromRow)]
struct StoryRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    author_id: Uuid,
    is_private: bool,
    status: StoryStatus,
    created_at: OffsetDateTime,
}

impl From<StoryRow> for StoryRecord {
    fn from(row: StoryRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            author_id: row.author_id,
            is_private: row.is_private,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StoryAuthorRow {
    #[sqlx(flatten)]
    story: StoryRow,
    author_username: String,
}

#[derive(sqlx::FromRow)]
struct StoryListRow {
    #[sqlx(flatten)]
    story: StoryRow,
    author_username: String,
    chapter_count: i64,
}

impl PostgresRepositories {
    fn apply_story_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q StoryQueryFilter) {
        qb.push(" WHERE (s.is_private = FALSE");
        if let Some(viewer) = filter.viewer {
            qb.push(" OR s.author_id = ").push_bind(viewer);
        }
        qb.push(")");

        if let Some(search) = filter.search.as_ref() {
            let pattern = format!("%{search}%");
            qb.push(" AND (s.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR s.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        if !filter.tag_ids.is_empty() {
            qb.push(" AND EXISTS (SELECT 1 FROM story_tags st WHERE st.story_id = s.id AND st.tag_id = ANY(")
                .push_bind(filter.tag_ids.as_slice())
                .push("))");
        }
    }
}

#[async_trait]
impl StoriesRepo for PostgresRepositories {
    async fn create_story(&self, params: CreateStoryParams) -> Result<StoryRecord, RepoError> {
        let row = sqlx::query_as::<_, StoryRow>(
            r#"
            INSERT INTO stories AS s (id, title, description, author_id, is_private, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING s.id, s.title, s.description, s.author_id, s.is_private, s.status, s.created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&params.title)
        .bind(&params.description)
        .bind(params.author_id)
        .bind(params.is_private)
        .bind(params.status)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_story(&self, id: Uuid) -> Result<Option<StoryRecord>, RepoError> {
        let row = sqlx::query_as::<_, StoryRow>(&format!(
            "SELECT {STORY_COLUMNS} FROM stories s WHERE s.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(StoryRecord::from))
    }

    async fn find_story_with_author(
        &self,
        id: Uuid,
    ) -> Result<Option<StoryWithAuthor>, RepoError> {
        let row = sqlx::query_as::<_, StoryAuthorRow>(&format!(
            "SELECT {STORY_COLUMNS}, u.username AS author_username \
             FROM stories s \
             INNER JOIN users u ON u.id = s.author_id \
             WHERE s.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| StoryWithAuthor {
            story: row.story.into(),
            author_username: row.author_username,
        }))
    }

    async fn list_stories(
        &self,
        filter: &StoryQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<StoryListItem>, RepoError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM stories s");
        Self::apply_story_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(STORY_COLUMNS);
        qb.push(
            ", u.username AS author_username, \
             (SELECT COUNT(*) FROM chapters c WHERE c.story_id = s.id) AS chapter_count \
             FROM stories s INNER JOIN users u ON u.id = s.author_id",
        );
        Self::apply_story_filter(&mut qb, filter);
        qb.push(" ORDER BY ");
        qb.push(filter.sort.order_by());
        qb.push(" LIMIT ").push_bind(page.limit());
        qb.push(" OFFSET ").push_bind(page.offset());

        let rows = qb
            .build_query_as::<StoryListRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let items = rows
            .into_iter()
            .map(|row| StoryListItem {
                story: row.story.into(),
                author_username: row.author_username,
                chapter_count: row.chapter_count,
            })
            .collect();
        Ok(Paginated::new(items, Self::convert_count(total)?, page))
    }

    async fn list_by_author(
        &self,
        author_id: Uuid,
        include_private: bool,
    ) -> Result<Vec<StoryRecord>, RepoError> {
        let rows = sqlx::query_as::<_, StoryRow>(&format!(
            "SELECT {STORY_COLUMNS} FROM stories s \
             WHERE s.author_id = $1 AND ($2 OR s.is_private = FALSE) \
             ORDER BY s.created_at DESC, s.id DESC"
        ))
        .bind(author_id)
        .bind(include_private)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(StoryRecord::from).collect())
    }

    async fn update_story(&self, params: UpdateStoryParams) -> Result<StoryRecord, RepoError> {
        let row = sqlx::query_as::<_, StoryRow>(
            r#"
            UPDATE stories AS s
            SET title = $2, description = $3, is_private = $4, status = $5
            WHERE s.id = $1
            RETURNING s.id, s.title, s.description, s.author_id, s.is_private, s.status, s.created_at
            "#,
        )
        .bind(params.id)
        .bind(&params.title)
        .bind(&params.description)
        .bind(params.is_private)
        .bind(params.status)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(StoryRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_story(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM stories WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all_stories(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<StoryRecord>, RepoError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stories")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, StoryRow>(&format!(
            "SELECT {STORY_COLUMNS} FROM stories s \
             ORDER BY s.created_at DESC, s.id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(StoryRecord::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }
}
