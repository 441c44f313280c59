use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{CommentWithAuthor, CommentsRepo, CreateCommentParams, RepoError},
    domain::entities::CommentRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const COMMENT_COLUMNS: &str =
    "c.id, c.content, c.author_id, c.story_id, c.chapter_id, c.parent_id, c.created_at, c.updated_at";

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    content: String,
    author_id: Uuid,
    story_id: Uuid,
    chapter_id: Option<Uuid>,
    parent_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            author_id: row.author_id,
            story_id: row.story_id,
            chapter_id: row.chapter_id,
            parent_id: row.parent_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentAuthorRow {
    #[sqlx(flatten)]
    comment: CommentRow,
    author_username: String,
}

impl From<CommentAuthorRow> for CommentWithAuthor {
    fn from(row: CommentAuthorRow) -> Self {
        Self {
            comment: row.comment.into(),
            author_username: row.author_username,
        }
    }
}

fn with_author(filter: &str, order: &str) -> String {
    format!(
        "SELECT {COMMENT_COLUMNS}, u.username AS author_username \
         FROM comments c INNER JOIN users u ON u.id = c.author_id \
         WHERE {filter} ORDER BY {order}"
    )
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "INSERT INTO comments AS c (id, content, author_id, story_id, chapter_id, parent_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&params.content)
        .bind(params.author_id)
        .bind(params.story_id)
        .bind(params.chapter_id)
        .bind(params.parent_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CommentRecord::from))
    }

    async fn update_comment(&self, id: Uuid, content: &str) -> Result<CommentRecord, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "UPDATE comments AS c SET content = $2, updated_at = now() \
             WHERE c.id = $1 RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(content)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(CommentRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_comment(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_root_for_story(
        &self,
        story_id: Uuid,
    ) -> Result<Vec<CommentWithAuthor>, RepoError> {
        let rows = sqlx::query_as::<_, CommentAuthorRow>(&with_author(
            "c.story_id = $1 AND c.parent_id IS NULL",
            "c.created_at DESC, c.id DESC",
        ))
        .bind(story_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentWithAuthor::from).collect())
    }

    async fn list_for_story(
        &self,
        story_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<CommentWithAuthor>, RepoError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE story_id = $1")
            .bind(story_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let sql = format!(
            "{} LIMIT $2 OFFSET $3",
            with_author("c.story_id = $1", "c.created_at DESC, c.id DESC")
        );
        let rows = sqlx::query_as::<_, CommentAuthorRow>(&sql)
            .bind(story_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(CommentWithAuthor::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }

    async fn list_for_chapter(
        &self,
        chapter_id: Uuid,
    ) -> Result<Vec<CommentWithAuthor>, RepoError> {
        let rows = sqlx::query_as::<_, CommentAuthorRow>(&with_author(
            "c.chapter_id = $1",
            "c.created_at DESC, c.id DESC",
        ))
        .bind(chapter_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentWithAuthor::from).collect())
    }

    async fn thread(&self, root_id: Uuid) -> Result<Vec<CommentWithAuthor>, RepoError> {
        let rows = sqlx::query_as::<_, CommentAuthorRow>(&format!(
            "WITH RECURSIVE subtree AS ( \
                 SELECT id FROM comments WHERE id = $1 \
                 UNION ALL \
                 SELECT child.id FROM comments child INNER JOIN subtree ON child.parent_id = subtree.id \
             ) \
             SELECT {COMMENT_COLUMNS}, u.username AS author_username \
             FROM comments c \
             INNER JOIN subtree ON subtree.id = c.id \
             INNER JOIN users u ON u.id = c.author_id \
             ORDER BY c.created_at ASC, c.id ASC"
        ))
        .bind(root_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentWithAuthor::from).collect())
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c \
             WHERE c.author_id = $1 \
             ORDER BY c.created_at DESC, c.id DESC"
        ))
        .bind(author_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    async fn list_all_comments(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<CommentRecord>, RepoError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c \
             ORDER BY c.created_at DESC, c.id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(CommentRecord::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }
}
