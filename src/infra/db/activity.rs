use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{ActivityRepo, FeedItem, NewActivity, RepoError},
    domain::{entities::ActivityRecord, types::ActivityType},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: Uuid,
    user_id: Uuid,
    activity_type: String,
    story_id: Option<Uuid>,
    chapter_id: Option<Uuid>,
    metadata: Option<serde_json::Value>,
    created_at: OffsetDateTime,
}

impl TryFrom<ActivityRow> for ActivityRecord {
    type Error = RepoError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let activity_type =
            ActivityType::try_from(row.activity_type.as_str()).map_err(|_| RepoError::Integrity {
                message: format!("unknown activity type `{}`", row.activity_type),
            })?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            activity_type,
            story_id: row.story_id,
            chapter_id: row.chapter_id,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FeedRow {
    #[sqlx(flatten)]
    activity: ActivityRow,
    actor_username: String,
    story_title: Option<String>,
    chapter_title: Option<String>,
}

#[async_trait]
impl ActivityRepo for PostgresRepositories {
    async fn append_activity(&self, activity: NewActivity) -> Result<ActivityRecord, RepoError> {
        let row = sqlx::query_as::<_, ActivityRow>(
            "INSERT INTO activity_feed (id, user_id, activity_type, story_id, chapter_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, user_id, activity_type, story_id, chapter_id, metadata, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(activity.user_id)
        .bind(activity.activity_type.as_str())
        .bind(activity.story_id)
        .bind(activity.chapter_id)
        .bind(activity.metadata)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn feed_for_follower(
        &self,
        follower_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FeedItem>, RepoError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM activity_feed a \
             INNER JOIN follows f ON f.following_id = a.user_id \
             WHERE f.follower_id = $1",
        )
        .bind(follower_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT a.id, a.user_id, a.activity_type, a.story_id, a.chapter_id, a.metadata, a.created_at,
                   u.username AS actor_username,
                   s.title AS story_title,
                   c.title AS chapter_title
            FROM activity_feed a
            INNER JOIN follows f ON f.following_id = a.user_id
            INNER JOIN users u ON u.id = a.user_id
            LEFT JOIN stories s ON s.id = a.story_id
            LEFT JOIN chapters c ON c.id = a.chapter_id
            WHERE f.follower_id = $1
            ORDER BY a.created_at DESC, a.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(follower_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let items = rows
            .into_iter()
            .map(|row| {
                Ok(FeedItem {
                    activity: row.activity.try_into()?,
                    actor_username: row.actor_username,
                    story_title: row.story_title,
                    chapter_title: row.chapter_title,
                })
            })
            .collect::<Result<Vec<_>, RepoError>>()?;

        Ok(Paginated::new(items, Self::convert_count(total)?, page))
    }
}
