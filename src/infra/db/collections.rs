use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{
        CollectionStoryItem, CollectionsRepo, CreateCollectionParams, RepoError,
        UpdateCollectionParams,
    },
    domain::entities::CollectionRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const COLLECTION_COLUMNS: &str = "id, name, description, owner_id, is_public, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CollectionRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    owner_id: Uuid,
    is_public: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CollectionRow> for CollectionRecord {
    fn from(row: CollectionRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            owner_id: row.owner_id,
            is_public: row.is_public,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CollectionStoryRow {
    story_id: Uuid,
    title: String,
    author_id: Uuid,
    is_private: bool,
    order: i32,
    added_at: OffsetDateTime,
}

impl From<CollectionStoryRow> for CollectionStoryItem {
    fn from(row: CollectionStoryRow) -> Self {
        Self {
            story_id: row.story_id,
            title: row.title,
            author_id: row.author_id,
            is_private: row.is_private,
            order: row.order,
            added_at: row.added_at,
        }
    }
}

#[async_trait]
impl CollectionsRepo for PostgresRepositories {
    async fn create_collection(
        &self,
        params: CreateCollectionParams,
    ) -> Result<CollectionRecord, RepoError> {
        let row = sqlx::query_as::<_, CollectionRow>(&format!(
            "INSERT INTO collections (id, name, description, owner_id, is_public) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLLECTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&params.name)
        .bind(&params.description)
        .bind(params.owner_id)
        .bind(params.is_public)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_collection(&self, id: Uuid) -> Result<Option<CollectionRecord>, RepoError> {
        let row = sqlx::query_as::<_, CollectionRow>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CollectionRecord::from))
    }

    async fn update_collection(
        &self,
        params: UpdateCollectionParams,
    ) -> Result<CollectionRecord, RepoError> {
        let row = sqlx::query_as::<_, CollectionRow>(&format!(
            "UPDATE collections SET name = $2, description = $3, is_public = $4, updated_at = now() \
             WHERE id = $1 RETURNING {COLLECTION_COLUMNS}"
        ))
        .bind(params.id)
        .bind(&params.name)
        .bind(&params.description)
        .bind(params.is_public)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(CollectionRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_collection(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<CollectionRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CollectionRow>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE owner_id = $1 \
             ORDER BY updated_at DESC, id DESC"
        ))
        .bind(owner_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CollectionRecord::from).collect())
    }

    async fn list_public(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<CollectionRecord>, RepoError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM collections WHERE is_public = TRUE")
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, CollectionRow>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE is_public = TRUE \
             ORDER BY updated_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(CollectionRecord::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }

    async fn is_collaborator(
        &self,
        collection_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM collection_collaborators \
             WHERE collection_id = $1 AND user_id = $2)",
        )
        .bind(collection_id)
        .bind(user_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn add_collaborator(
        &self,
        collection_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "INSERT INTO collection_collaborators (collection_id, user_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(collection_id)
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_collaborator(
        &self,
        collection_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "DELETE FROM collection_collaborators WHERE collection_id = $1 AND user_id = $2",
        )
        .bind(collection_id)
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_story(&self, collection_id: Uuid, story_id: Uuid) -> Result<bool, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            INSERT INTO collection_stories (collection_id, story_id, "order")
            VALUES (
                $1, $2,
                (SELECT COALESCE(MAX("order"), 0) + 1 FROM collection_stories WHERE collection_id = $1)
            )
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(collection_id)
        .bind(story_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let added = result.rows_affected() > 0;
        if added {
            sqlx::query("UPDATE collections SET updated_at = now() WHERE id = $1")
                .bind(collection_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(added)
    }

    async fn remove_story(&self, collection_id: Uuid, story_id: Uuid) -> Result<bool, RepoError> {
        let result =
            sqlx::query("DELETE FROM collection_stories WHERE collection_id = $1 AND story_id = $2")
                .bind(collection_id)
                .bind(story_id)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_stories(
        &self,
        collection_id: Uuid,
    ) -> Result<Vec<CollectionStoryItem>, RepoError> {
        let rows = sqlx::query_as::<_, CollectionStoryRow>(
            r#"
            SELECT cs.story_id, s.title, s.author_id, s.is_private, cs."order", cs.added_at
            FROM collection_stories cs
            INNER JOIN stories s ON s.id = cs.story_id
            WHERE cs.collection_id = $1
            ORDER BY cs."order" ASC, cs.added_at ASC
            "#,
        )
        .bind(collection_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CollectionStoryItem::from).collect())
    }
}
