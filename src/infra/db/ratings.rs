use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RatingStats, RatingsRepo, RepoError},
    domain::entities::RatingRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const RATING_COLUMNS: &str = "id, rate, author_id, story_id, created_at";

#[derive(sqlx::FromRow)]
struct RatingRow {
    id: Uuid,
    rate: i16,
    author_id: Uuid,
    story_id: Uuid,
    created_at: OffsetDateTime,
}

impl From<RatingRow> for RatingRecord {
    fn from(row: RatingRow) -> Self {
        Self {
            id: row.id,
            rate: row.rate,
            author_id: row.author_id,
            story_id: row.story_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    count: i64,
    sum: Option<i64>,
    average: Option<f64>,
}

#[async_trait]
impl RatingsRepo for PostgresRepositories {
    async fn create_rating(
        &self,
        story_id: Uuid,
        author_id: Uuid,
        rate: i16,
    ) -> Result<RatingRecord, RepoError> {
        let row = sqlx::query_as::<_, RatingRow>(&format!(
            "INSERT INTO ratings (id, rate, author_id, story_id) VALUES ($1, $2, $3, $4) \
             RETURNING {RATING_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(rate)
        .bind(author_id)
        .bind(story_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_rating(&self, id: Uuid) -> Result<Option<RatingRecord>, RepoError> {
        let row = sqlx::query_as::<_, RatingRow>(&format!(
            "SELECT {RATING_COLUMNS} FROM ratings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(RatingRecord::from))
    }

    async fn update_rating(&self, id: Uuid, rate: i16) -> Result<RatingRecord, RepoError> {
        let row = sqlx::query_as::<_, RatingRow>(&format!(
            "UPDATE ratings SET rate = $2 WHERE id = $1 RETURNING {RATING_COLUMNS}"
        ))
        .bind(id)
        .bind(rate)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(RatingRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_rating(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM ratings WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<RatingRecord>, RepoError> {
        let rows = sqlx::query_as::<_, RatingRow>(&format!(
            "SELECT {RATING_COLUMNS} FROM ratings WHERE story_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(story_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(RatingRecord::from).collect())
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<RatingRecord>, RepoError> {
        let rows = sqlx::query_as::<_, RatingRow>(&format!(
            "SELECT {RATING_COLUMNS} FROM ratings WHERE author_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(author_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(RatingRecord::from).collect())
    }

    async fn stats_for_story(&self, story_id: Uuid) -> Result<RatingStats, RepoError> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT COUNT(*) AS count, SUM(rate)::int8 AS sum, AVG(rate)::float8 AS average \
             FROM ratings WHERE story_id = $1",
        )
        .bind(story_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(RatingStats {
            count: row.count,
            sum: row.sum.unwrap_or(0),
            average: row.average,
        })
    }
}
