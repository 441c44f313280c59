use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, TagQueryFilter, TagsRepo},
    domain::entities::TagRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const TAG_COLUMNS: &str = "t.id, t.name, t.category, t.created_at";
const TAG_ORDER: &str = "t.category ASC NULLS FIRST, LOWER(t.name) ASC";

#[derive(sqlx::FromRow)]
struct TagRow {
    id: Uuid,
    name: String,
    category: Option<String>,
    created_at: OffsetDateTime,
}

impl From<TagRow> for TagRecord {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            category: row.category,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl TagsRepo for PostgresRepositories {
    async fn create_tag(
        &self,
        name: &str,
        category: Option<&str>,
    ) -> Result<TagRecord, RepoError> {
        let row = sqlx::query_as::<_, TagRow>(&format!(
            "INSERT INTO tags AS t (id, name, category) VALUES ($1, $2, $3) RETURNING {TAG_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(category)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_tag(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError> {
        let row = sqlx::query_as::<_, TagRow>(&format!(
            "SELECT {TAG_COLUMNS} FROM tags t WHERE t.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(TagRecord::from))
    }

    async fn find_tags(&self, ids: &[Uuid]) -> Result<Vec<TagRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TagRow>(&format!(
            "SELECT {TAG_COLUMNS} FROM tags t WHERE t.id = ANY($1) ORDER BY {TAG_ORDER}"
        ))
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TagRecord::from).collect())
    }

    async fn update_tag(
        &self,
        id: Uuid,
        name: &str,
        category: Option<&str>,
    ) -> Result<TagRecord, RepoError> {
        let row = sqlx::query_as::<_, TagRow>(&format!(
            "UPDATE tags AS t SET name = $2, category = $3 WHERE t.id = $1 RETURNING {TAG_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(category)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(TagRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_tag(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_tags(&self, filter: &TagQueryFilter) -> Result<Vec<TagRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(TAG_COLUMNS).push(" FROM tags t WHERE TRUE");
        if let Some(search) = filter.search.as_ref() {
            qb.push(" AND t.name ILIKE ").push_bind(format!("%{search}%"));
        }
        if let Some(category) = filter.category.as_ref() {
            qb.push(" AND t.category = ").push_bind(category.clone());
        }
        qb.push(" ORDER BY ").push(TAG_ORDER);

        let rows = qb
            .build_query_as::<TagRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TagRecord::from).collect())
    }

    async fn list_categories(&self) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM tags WHERE category IS NOT NULL ORDER BY category",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<TagRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TagRow>(&format!(
            "SELECT {TAG_COLUMNS} FROM tags t \
             INNER JOIN story_tags st ON st.tag_id = t.id \
             WHERE st.story_id = $1 ORDER BY {TAG_ORDER}"
        ))
        .bind(story_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TagRecord::from).collect())
    }

    async fn replace_story_tags(&self, story_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM story_tags WHERE story_id = $1")
            .bind(story_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if !tag_ids.is_empty() {
            sqlx::query(
                "INSERT INTO story_tags (story_id, tag_id) \
                 SELECT $1, id FROM UNNEST($2::uuid[]) AS id \
                 ON CONFLICT DO NOTHING",
            )
            .bind(story_id)
            .bind(tag_ids)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn remove_story_tag(&self, story_id: Uuid, tag_id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM story_tags WHERE story_id = $1 AND tag_id = $2")
            .bind(story_id)
            .bind(tag_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_story_tags(&self, story_id: Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM story_tags WHERE story_id = $1")
            .bind(story_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn stories_with_tag(&self, tag_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        sqlx::query_scalar::<_, Uuid>("SELECT story_id FROM story_tags WHERE tag_id = $1")
            .bind(tag_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
