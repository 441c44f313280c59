//! Repository traits describing persistence adapters.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{PageRequest, Paginated};
use crate::domain::entities::{
    ActivityRecord, BookmarkRecord, ChapterRecord, CollectionRecord, CommentRecord, FollowRecord,
    MessageRecord, RatingRecord, ReadHistoryRecord, StoryRecord, TagRecord, UserRecord,
};
use crate::domain::types::{ActivityType, StorySort, StoryStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

// ----- users -----

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub password_hash: String,
    pub description: Option<String>,
    pub is_admin: bool,
}

/// Partial update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserParams {
    pub id: Uuid,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub description: Option<String>,
    pub is_admin: Option<bool>,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn find_user_by_username(&self, username: &str)
    -> Result<Option<UserRecord>, RepoError>;

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError>;

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError>;

    async fn list_users(&self, page: PageRequest) -> Result<Paginated<UserRecord>, RepoError>;
}

// ----- stories -----

#[derive(Debug, Clone)]
pub struct CreateStoryParams {
    pub author_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub status: StoryStatus,
}

#[derive(Debug, Clone)]
pub struct UpdateStoryParams {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub status: StoryStatus,
}

#[derive(Debug, Clone, Default)]
pub struct StoryQueryFilter {
    pub search: Option<String>,
    /// Matches stories carrying any of these tags.
    pub tag_ids: Vec<Uuid>,
    pub sort: StorySort,
    /// Private stories owned by this user are included.
    pub viewer: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryWithAuthor {
    #[serde(flatten)]
    pub story: StoryRecord,
    pub author_username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryListItem {
    #[serde(flatten)]
    pub story: StoryRecord,
    pub author_username: String,
    pub chapter_count: i64,
}

#[async_trait]
pub trait StoriesRepo: Send + Sync {
    async fn create_story(&self, params: CreateStoryParams) -> Result<StoryRecord, RepoError>;

    async fn find_story(&self, id: Uuid) -> Result<Option<StoryRecord>, RepoError>;

    async fn find_story_with_author(&self, id: Uuid)
    -> Result<Option<StoryWithAuthor>, RepoError>;

    async fn list_stories(
        &self,
        filter: &StoryQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<StoryListItem>, RepoError>;

    async fn list_by_author(
        &self,
        author_id: Uuid,
        include_private: bool,
    ) -> Result<Vec<StoryRecord>, RepoError>;

    async fn update_story(&self, params: UpdateStoryParams) -> Result<StoryRecord, RepoError>;

    async fn delete_story(&self, id: Uuid) -> Result<bool, RepoError>;

    async fn list_all_stories(&self, page: PageRequest)
    -> Result<Paginated<StoryRecord>, RepoError>;
}

// ----- chapters -----

#[derive(Debug, Clone)]
pub struct CreateChapterParams {
    pub story_id: Uuid,
    pub title: String,
    pub content: String,
    /// `None` appends after the current last chapter.
    pub order: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct UpdateChapterParams {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub order: i32,
}

#[async_trait]
pub trait ChaptersRepo: Send + Sync {
    async fn create_chapter(&self, params: CreateChapterParams)
    -> Result<ChapterRecord, RepoError>;

    async fn find_chapter(&self, id: Uuid) -> Result<Option<ChapterRecord>, RepoError>;

    /// Chapters of a story in ascending `order`.
    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<ChapterRecord>, RepoError>;

    async fn update_chapter(&self, params: UpdateChapterParams)
    -> Result<ChapterRecord, RepoError>;

    async fn delete_chapter(&self, id: Uuid) -> Result<bool, RepoError>;

    async fn list_all_chapters(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<ChapterRecord>, RepoError>;
}

// ----- comments -----

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub story_id: Uuid,
    pub chapter_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub author_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: CommentRecord,
    pub author_username: String,
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    async fn create_comment(&self, params: CreateCommentParams)
    -> Result<CommentRecord, RepoError>;

    async fn find_comment(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError>;

    async fn update_comment(&self, id: Uuid, content: &str) -> Result<CommentRecord, RepoError>;

    /// Replies are removed by the `parent_id` cascade.
    async fn delete_comment(&self, id: Uuid) -> Result<bool, RepoError>;

    /// Root-level comments of a story, newest first.
    async fn list_root_for_story(
        &self,
        story_id: Uuid,
    ) -> Result<Vec<CommentWithAuthor>, RepoError>;

    /// Every comment of a story, newest first.
    async fn list_for_story(
        &self,
        story_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<CommentWithAuthor>, RepoError>;

    /// Comments attached to a chapter, newest first.
    async fn list_for_chapter(
        &self,
        chapter_id: Uuid,
    ) -> Result<Vec<CommentWithAuthor>, RepoError>;

    /// The comment and its whole reply subtree, oldest first.
    async fn thread(&self, root_id: Uuid) -> Result<Vec<CommentWithAuthor>, RepoError>;

    /// Every comment written by the user, newest first.
    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<CommentRecord>, RepoError>;

    async fn list_all_comments(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<CommentRecord>, RepoError>;
}

// ----- ratings -----

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingStats {
    pub count: i64,
    pub sum: i64,
    pub average: Option<f64>,
}

#[async_trait]
pub trait RatingsRepo: Send + Sync {
    /// Fails with `Duplicate` when the author already rated the story.
    async fn create_rating(
        &self,
        story_id: Uuid,
        author_id: Uuid,
        rate: i16,
    ) -> Result<RatingRecord, RepoError>;

    async fn find_rating(&self, id: Uuid) -> Result<Option<RatingRecord>, RepoError>;

    async fn update_rating(&self, id: Uuid, rate: i16) -> Result<RatingRecord, RepoError>;

    async fn delete_rating(&self, id: Uuid) -> Result<bool, RepoError>;

    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<RatingRecord>, RepoError>;

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<RatingRecord>, RepoError>;

    async fn stats_for_story(&self, story_id: Uuid) -> Result<RatingStats, RepoError>;
}

// ----- tags -----

#[derive(Debug, Clone, Default)]
pub struct TagQueryFilter {
    pub search: Option<String>,
    pub category: Option<String>,
}

#[async_trait]
pub trait TagsRepo: Send + Sync {
    /// Names are unique case-insensitively.
    async fn create_tag(&self, name: &str, category: Option<&str>)
    -> Result<TagRecord, RepoError>;

    async fn find_tag(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError>;

    async fn find_tags(&self, ids: &[Uuid]) -> Result<Vec<TagRecord>, RepoError>;

    async fn update_tag(
        &self,
        id: Uuid,
        name: &str,
        category: Option<&str>,
    ) -> Result<TagRecord, RepoError>;

    async fn delete_tag(&self, id: Uuid) -> Result<bool, RepoError>;

    /// Ordered by `(category, name)`.
    async fn list_tags(&self, filter: &TagQueryFilter) -> Result<Vec<TagRecord>, RepoError>;

    async fn list_categories(&self) -> Result<Vec<String>, RepoError>;

    /// Tags of one story ordered by `(category, name)`.
    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<TagRecord>, RepoError>;

    /// Atomically replace the tag set of a story.
    async fn replace_story_tags(&self, story_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError>;

    async fn remove_story_tag(&self, story_id: Uuid, tag_id: Uuid) -> Result<bool, RepoError>;

    async fn clear_story_tags(&self, story_id: Uuid) -> Result<u64, RepoError>;

    async fn stories_with_tag(&self, tag_id: Uuid) -> Result<Vec<Uuid>, RepoError>;
}

// ----- bookmarks -----

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestChapter {
    pub id: Uuid,
    pub title: String,
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkListItem {
    #[serde(flatten)]
    pub bookmark: BookmarkRecord,
    pub story_title: String,
    pub story_author_id: Uuid,
    pub latest_chapter: Option<LatestChapter>,
}

#[async_trait]
pub trait BookmarksRepo: Send + Sync {
    async fn create_bookmark(
        &self,
        user_id: Uuid,
        story_id: Uuid,
    ) -> Result<BookmarkRecord, RepoError>;

    async fn delete_bookmark(&self, user_id: Uuid, story_id: Uuid) -> Result<bool, RepoError>;

    async fn bookmark_exists(&self, user_id: Uuid, story_id: Uuid) -> Result<bool, RepoError>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<BookmarkListItem>, RepoError>;
}

// ----- follows -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUser {
    pub user_id: Uuid,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub followed_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowStats {
    pub followers: u64,
    pub following: u64,
}

#[async_trait]
pub trait FollowsRepo: Send + Sync {
    /// Fails with `Duplicate` when the edge already exists.
    async fn create_follow(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<FollowRecord, RepoError>;

    async fn delete_follow(&self, follower_id: Uuid, following_id: Uuid)
    -> Result<bool, RepoError>;

    async fn follow_exists(&self, follower_id: Uuid, following_id: Uuid)
    -> Result<bool, RepoError>;

    async fn list_followers(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FollowUser>, RepoError>;

    async fn list_following(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FollowUser>, RepoError>;

    async fn follow_stats(&self, user_id: Uuid) -> Result<FollowStats, RepoError>;
}

// ----- activity -----

#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub user_id: Uuid,
    pub activity_type: ActivityType,
    pub story_id: Option<Uuid>,
    pub chapter_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(flatten)]
    pub activity: ActivityRecord,
    pub actor_username: String,
    pub story_title: Option<String>,
    pub chapter_title: Option<String>,
}

#[async_trait]
pub trait ActivityRepo: Send + Sync {
    async fn append_activity(&self, activity: NewActivity) -> Result<ActivityRecord, RepoError>;

    /// Entries authored by users that `follower_id` follows, newest first.
    async fn feed_for_follower(
        &self,
        follower_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FeedItem>, RepoError>;
}

// ----- read history -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadHistoryItem {
    #[serde(flatten)]
    pub record: ReadHistoryRecord,
    pub story_title: Option<String>,
    pub chapter_title: Option<String>,
    pub chapter_order: Option<i32>,
}

#[async_trait]
pub trait ReadHistoryRepo: Send + Sync {
    /// Upsert keyed by `(story_id, user_id)`. A `None` chapter keeps the previously recorded one.
    async fn record_read(
        &self,
        user_id: Uuid,
        story_id: Uuid,
        chapter_id: Option<Uuid>,
    ) -> Result<ReadHistoryRecord, RepoError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ReadHistoryItem>, RepoError>;

    async fn find_for_story(
        &self,
        user_id: Uuid,
        story_id: Uuid,
    ) -> Result<Option<ReadHistoryItem>, RepoError>;
}

// ----- collections -----

#[derive(Debug, Clone)]
pub struct CreateCollectionParams {
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateCollectionParams {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStoryItem {
    pub story_id: Uuid,
    pub title: String,
    pub author_id: Uuid,
    pub is_private: bool,
    pub order: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

#[async_trait]
pub trait CollectionsRepo: Send + Sync {
    async fn create_collection(
        &self,
        params: CreateCollectionParams,
    ) -> Result<CollectionRecord, RepoError>;

    async fn find_collection(&self, id: Uuid) -> Result<Option<CollectionRecord>, RepoError>;

    async fn update_collection(
        &self,
        params: UpdateCollectionParams,
    ) -> Result<CollectionRecord, RepoError>;

    async fn delete_collection(&self, id: Uuid) -> Result<bool, RepoError>;

    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<CollectionRecord>, RepoError>;

    async fn list_public(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<CollectionRecord>, RepoError>;

    async fn is_collaborator(&self, collection_id: Uuid, user_id: Uuid)
    -> Result<bool, RepoError>;

    /// Returns false when the user already collaborates.
    async fn add_collaborator(
        &self,
        collection_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, RepoError>;

    async fn remove_collaborator(
        &self,
        collection_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, RepoError>;

    /// Appends with `order = max + 1`; returns false when already present.
    async fn add_story(&self, collection_id: Uuid, story_id: Uuid) -> Result<bool, RepoError>;

    async fn remove_story(&self, collection_id: Uuid, story_id: Uuid) -> Result<bool, RepoError>;

    async fn list_stories(
        &self,
        collection_id: Uuid,
    ) -> Result<Vec<CollectionStoryItem>, RepoError>;
}

// ----- messages -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub other_user_id: Uuid,
    pub other_username: String,
    pub last_message: MessageRecord,
    pub unread_count: i64,
}

#[async_trait]
pub trait MessagesRepo: Send + Sync {
    async fn send_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<MessageRecord, RepoError>;

    async fn find_message(&self, id: Uuid) -> Result<Option<MessageRecord>, RepoError>;

    /// Latest visible message per counterpart, newest conversation first.
    async fn list_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, RepoError>;

    /// Messages between two users not deleted by `user_id`, newest first.
    async fn history(
        &self,
        user_id: Uuid,
        other_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<MessageRecord>, RepoError>;

    /// Mark messages from `other_id` to `user_id` as read.
    async fn mark_read(&self, user_id: Uuid, other_id: Uuid) -> Result<u64, RepoError>;

    /// Hide a message for one participant only.
    async fn soft_delete(&self, id: Uuid, user_id: Uuid) -> Result<bool, RepoError>;

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, RepoError>;
}

/// One handle per repository seam, shared by every service.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UsersRepo>,
    pub stories: Arc<dyn StoriesRepo>,
    pub chapters: Arc<dyn ChaptersRepo>,
    pub comments: Arc<dyn CommentsRepo>,
    pub ratings: Arc<dyn RatingsRepo>,
    pub tags: Arc<dyn TagsRepo>,
    pub bookmarks: Arc<dyn BookmarksRepo>,
    pub follows: Arc<dyn FollowsRepo>,
    pub activity: Arc<dyn ActivityRepo>,
    pub read_history: Arc<dyn ReadHistoryRepo>,
    pub collections: Arc<dyn CollectionsRepo>,
    pub messages: Arc<dyn MessagesRepo>,
}

impl Repositories {
    /// Every seam served by one backend.
    pub fn from_backend<R>(backend: Arc<R>) -> Self
    where
        R: UsersRepo
            + StoriesRepo
            + ChaptersRepo
            + CommentsRepo
            + RatingsRepo
            + TagsRepo
            + BookmarksRepo
            + FollowsRepo
            + ActivityRepo
            + ReadHistoryRepo
            + CollectionsRepo
            + MessagesRepo
            + 'static,
    {
        Self {
            users: backend.clone(),
            stories: backend.clone(),
            chapters: backend.clone(),
            comments: backend.clone(),
            ratings: backend.clone(),
            tags: backend.clone(),
            bookmarks: backend.clone(),
            follows: backend.clone(),
            activity: backend.clone(),
            read_history: backend.clone(),
            collections: backend.clone(),
            messages: backend,
        }
    }
}
