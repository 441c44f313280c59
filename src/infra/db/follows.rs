use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{FollowStats, FollowUser, FollowsRepo, RepoError},
    domain::entities::FollowRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct FollowRow {
    id: Uuid,
    follower_id: Uuid,
    following_id: Uuid,
    created_at: OffsetDateTime,
}

impl From<FollowRow> for FollowRecord {
    fn from(row: FollowRow) -> Self {
        Self {
            id: row.id,
            follower_id: row.follower_id,
            following_id: row.following_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FollowUserRow {
    user_id: Uuid,
    username: String,
    followed_at: OffsetDateTime,
}

impl From<FollowUserRow> for FollowUser {
    fn from(row: FollowUserRow) -> Self {
        Self {
            user_id: row.user_id,
            username: row.username,
            followed_at: row.followed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FollowStatsRow {
    followers: i64,
    following: i64,
}

/// Which side of the edge the listed users sit on.
#[derive(Clone, Copy)]
enum Side {
    Followers,
    Following,
}

impl Side {
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            // (filter column, listed column)
            Side::Followers => ("following_id", "follower_id"),
            Side::Following => ("follower_id", "following_id"),
        }
    }
}

impl PostgresRepositories {
    async fn list_edges(
        &self,
        user_id: Uuid,
        side: Side,
        page: PageRequest,
    ) -> Result<Paginated<FollowUser>, RepoError> {
        let (filter, listed) = side.columns();

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM follows WHERE {filter} = $1"))
                .bind(user_id)
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, FollowUserRow>(&format!(
            "SELECT u.id AS user_id, u.username, f.created_at AS followed_at \
             FROM follows f INNER JOIN users u ON u.id = f.{listed} \
             WHERE f.{filter} = $1 \
             ORDER BY f.created_at DESC, f.id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(FollowUser::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }
}

#[async_trait]
impl FollowsRepo for PostgresRepositories {
    async fn create_follow(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<FollowRecord, RepoError> {
        let row = sqlx::query_as::<_, FollowRow>(
            "INSERT INTO follows (id, follower_id, following_id) VALUES ($1, $2, $3) \
             RETURNING id, follower_id, following_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(follower_id)
        .bind(following_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn delete_follow(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<bool, RepoError> {
        let result =
            sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND following_id = $2")
                .bind(follower_id)
                .bind(following_id)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn follow_exists(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE follower_id = $1 AND following_id = $2)",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn list_followers(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FollowUser>, RepoError> {
        self.list_edges(user_id, Side::Followers, page).await
    }

    async fn list_following(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FollowUser>, RepoError> {
        self.list_edges(user_id, Side::Following, page).await
    }

    async fn follow_stats(&self, user_id: Uuid) -> Result<FollowStats, RepoError> {
        let row = sqlx::query_as::<_, FollowStatsRow>(
            "SELECT \
                 (SELECT COUNT(*) FROM follows WHERE following_id = $1) AS followers, \
                 (SELECT COUNT(*) FROM follows WHERE follower_id = $1) AS following",
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(FollowStats {
            followers: Self::convert_count(row.followers)?,
            following: Self::convert_count(row.following)?,
        })
    }
}
