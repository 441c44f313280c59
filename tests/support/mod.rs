//! In-memory doubles for the repository and cache seams.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use storytell::application::activity::ActivityService;
use storytell::application::auth::{Principal, TokenService};
use storytell::application::chapters::ChapterService;
use storytell::application::comments::CommentService;
use storytell::application::follows::FollowService;
use storytell::application::pagination::{PageRequest, Paginated};
use storytell::application::ratings::RatingService;
use storytell::application::read_model::ReadModelBuilder;
use storytell::application::repos::*;
use storytell::application::stories::StoryService;
use storytell::application::users::UserService;
use storytell::cache::{
    CacheConfig, CacheError, CacheStore, CacheTrigger, MemoryCacheStore, ViewCache,
};
use storytell::domain::entities::*;
use storytell::infra::http::{ApiRateLimiter, ApiState};

pub const JWT_SECRET: &str = "integration-secret";

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    stories: HashMap<Uuid, StoryRecord>,
    chapters: HashMap<Uuid, ChapterRecord>,
    comments: HashMap<Uuid, CommentRecord>,
    ratings: HashMap<Uuid, RatingRecord>,
    tags: HashMap<Uuid, TagRecord>,
    story_tags: Vec<(Uuid, Uuid)>,
    bookmarks: HashMap<Uuid, BookmarkRecord>,
    follows: HashMap<Uuid, FollowRecord>,
    activities: Vec<ActivityRecord>,
    read_history: HashMap<(Uuid, Uuid), ReadHistoryRecord>,
    collections: HashMap<Uuid, CollectionRecord>,
    collaborators: Vec<(Uuid, Uuid)>,
    collection_stories: Vec<(Uuid, Uuid, i32, OffsetDateTime)>,
    messages: HashMap<Uuid, MessageRecord>,
}

impl Tables {
    fn remove_story(&mut self, id: Uuid) -> bool {
        if self.stories.remove(&id).is_none() {
            return false;
        }
        self.chapters.retain(|_, chapter| chapter.story_id != id);
        self.comments.retain(|_, comment| comment.story_id != id);
        self.ratings.retain(|_, rating| rating.story_id != id);
        self.story_tags.retain(|(story, _)| *story != id);
        self.bookmarks.retain(|_, bookmark| bookmark.story_id != id);
        self.read_history.retain(|(story, _), _| *story != id);
        self.collection_stories.retain(|(_, story, ..)| *story != id);
        true
    }

    /// Mirrors the `parent_id` cascade.
    fn remove_comment(&mut self, id: Uuid) -> bool {
        if self.comments.remove(&id).is_none() {
            return false;
        }
        let mut doomed = vec![id];
        while let Some(parent) = doomed.pop() {
            let children: Vec<Uuid> = self
                .comments
                .values()
                .filter(|comment| comment.parent_id == Some(parent))
                .map(|comment| comment.id)
                .collect();
            for child in children {
                self.comments.remove(&child);
                doomed.push(child);
            }
        }
        true
    }

    /// Mirrors every `ON DELETE CASCADE` hanging off `users`.
    fn remove_user(&mut self, id: Uuid) -> bool {
        if self.users.remove(&id).is_none() {
            return false;
        }
        let stories: Vec<Uuid> = self
            .stories
            .values()
            .filter(|story| story.author_id == id)
            .map(|story| story.id)
            .collect();
        for story in stories {
            self.remove_story(story);
        }
        let comments: Vec<Uuid> = self
            .comments
            .values()
            .filter(|comment| comment.author_id == id)
            .map(|comment| comment.id)
            .collect();
        for comment in comments {
            self.remove_comment(comment);
        }
        self.ratings.retain(|_, rating| rating.author_id != id);
        self.bookmarks.retain(|_, bookmark| bookmark.user_id != id);
        self.follows
            .retain(|_, follow| follow.follower_id != id && follow.following_id != id);
        self.activities.retain(|activity| activity.user_id != id);
        self.read_history.retain(|(_, user), _| *user != id);
        self.messages
            .retain(|_, message| message.sender_id != id && message.receiver_id != id);
        let collections: Vec<Uuid> = self
            .collections
            .values()
            .filter(|collection| collection.owner_id == id)
            .map(|collection| collection.id)
            .collect();
        self.collections.retain(|_, collection| collection.owner_id != id);
        self.collaborators
            .retain(|(collection, user)| *user != id && !collections.contains(collection));
        self.collection_stories
            .retain(|(collection, ..)| !collections.contains(collection));
        true
    }

    fn username(&self, id: Uuid) -> String {
        self.users
            .get(&id)
            .map(|user| user.username.clone())
            .unwrap_or_default()
    }

    fn comment_with_author(&self, comment: &CommentRecord) -> CommentWithAuthor {
        CommentWithAuthor {
            comment: comment.clone(),
            author_username: self.username(comment.author_id),
        }
    }

    fn tags_for_story(&self, story_id: Uuid) -> Vec<TagRecord> {
        let mut tags: Vec<TagRecord> = self
            .story_tags
            .iter()
            .filter(|(story, _)| *story == story_id)
            .filter_map(|(_, tag)| self.tags.get(tag).cloned())
            .collect();
        sort_tags(&mut tags);
        tags
    }

    fn history_item(&self, record: &ReadHistoryRecord) -> ReadHistoryItem {
        let chapter = record.chapter_id.and_then(|id| self.chapters.get(&id));
        ReadHistoryItem {
            record: record.clone(),
            story_title: self.stories.get(&record.story_id).map(|s| s.title.clone()),
            chapter_title: chapter.map(|c| c.title.clone()),
            chapter_order: chapter.map(|c| c.order),
        }
    }

    fn follow_users(&self, edges: Vec<(Uuid, OffsetDateTime)>, page: PageRequest) -> Paginated<FollowUser> {
        let users: Vec<FollowUser> = edges
            .into_iter()
            .map(|(user_id, followed_at)| FollowUser {
                user_id,
                username: self.username(user_id),
                followed_at,
            })
            .collect();
        paginate(users, page)
    }
}

fn sort_tags(tags: &mut [TagRecord]) {
    tags.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> Paginated<T> {
    let total = items.len() as u64;
    let data = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Paginated::new(data, total, page)
}

fn duplicate(constraint: &str) -> RepoError {
    RepoError::Duplicate {
        constraint: constraint.to_string(),
    }
}

/// Every repository seam over shared in-memory tables.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    clock: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Monotonic timestamps so ordering assertions never tie.
    fn now(&self) -> OffsetDateTime {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        OffsetDateTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + tick)
    }

    pub async fn activities(&self) -> Vec<ActivityRecord> {
        self.tables.lock().await.activities.clone()
    }

    pub async fn insert_user(&self, username: &str) -> Principal {
        let user = self
            .create_user(CreateUserParams {
                username: username.to_string(),
                password_hash: String::new(),
                description: None,
                is_admin: false,
            })
            .await
            .expect("insert user");
        Principal {
            id: user.id,
            username: user.username,
            is_admin: false,
        }
    }
}

#[async_trait]
impl UsersRepo for MemoryBackend {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let created_at = self.now();
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .values()
            .any(|user| user.username == params.username)
        {
            return Err(duplicate("users_username_key"));
        }
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: params.username,
            password_hash: params.password_hash,
            description: params.description,
            is_admin: params.is_admin,
            created_at,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        if let Some(username) = params.username {
            user.username = username;
        }
        if let Some(hash) = params.password_hash {
            user.password_hash = hash;
        }
        if params.description.is_some() {
            user.description = params.description;
        }
        if let Some(is_admin) = params.is_admin {
            user.is_admin = is_admin;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.tables.lock().await.remove_user(id))
    }

    async fn list_users(&self, page: PageRequest) -> Result<Paginated<UserRecord>, RepoError> {
        let mut users: Vec<UserRecord> = self.tables.lock().await.users.values().cloned().collect();
        users.sort_by_key(|user| user.created_at);
        Ok(paginate(users, page))
    }
}

#[async_trait]
impl StoriesRepo for MemoryBackend {
    async fn create_story(&self, params: CreateStoryParams) -> Result<StoryRecord, RepoError> {
        let created_at = self.now();
        let story = StoryRecord {
            id: Uuid::new_v4(),
            title: params.title,
            description: params.description,
            author_id: params.author_id,
            is_private: params.is_private,
            status: params.status,
            created_at,
        };
        self.tables
            .lock()
            .await
            .stories
            .insert(story.id, story.clone());
        Ok(story)
    }

    async fn find_story(&self, id: Uuid) -> Result<Option<StoryRecord>, RepoError> {
        Ok(self.tables.lock().await.stories.get(&id).cloned())
    }

    async fn find_story_with_author(
        &self,
        id: Uuid,
    ) -> Result<Option<StoryWithAuthor>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.stories.get(&id).map(|story| StoryWithAuthor {
            story: story.clone(),
            author_username: tables.username(story.author_id),
        }))
    }

    async fn list_stories(
        &self,
        filter: &StoryQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<StoryListItem>, RepoError> {
        let tables = self.tables.lock().await;
        let mut items: Vec<StoryListItem> = tables
            .stories
            .values()
            .filter(|story| story.visible_to(filter.viewer))
            .filter(|story| match &filter.search {
                Some(search) => story.title.to_lowercase().contains(&search.to_lowercase()),
                None => true,
            })
            .filter(|story| {
                filter.tag_ids.is_empty()
                    || tables
                        .story_tags
                        .iter()
                        .any(|(s, t)| *s == story.id && filter.tag_ids.contains(t))
            })
            .map(|story| StoryListItem {
                story: story.clone(),
                author_username: tables.username(story.author_id),
                chapter_count: tables
                    .chapters
                    .values()
                    .filter(|chapter| chapter.story_id == story.id)
                    .count() as i64,
            })
            .collect();
        items.sort_by(|a, b| b.story.created_at.cmp(&a.story.created_at));
        Ok(paginate(items, page))
    }

    async fn list_by_author(
        &self,
        author_id: Uuid,
        include_private: bool,
    ) -> Result<Vec<StoryRecord>, RepoError> {
        let mut stories: Vec<StoryRecord> = self
            .tables
            .lock()
            .await
            .stories
            .values()
            .filter(|story| story.author_id == author_id && (include_private || !story.is_private))
            .cloned()
            .collect();
        stories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(stories)
    }

    async fn update_story(&self, params: UpdateStoryParams) -> Result<StoryRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let story = tables
            .stories
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        story.title = params.title;
        story.description = params.description;
        story.is_private = params.is_private;
        story.status = params.status;
        Ok(story.clone())
    }

    async fn delete_story(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.tables.lock().await.remove_story(id))
    }

    async fn list_all_stories(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<StoryRecord>, RepoError> {
        let stories: Vec<StoryRecord> = self.tables.lock().await.stories.values().cloned().collect();
        Ok(paginate(stories, page))
    }
}

#[async_trait]
impl ChaptersRepo for MemoryBackend {
    async fn create_chapter(
        &self,
        params: CreateChapterParams,
    ) -> Result<ChapterRecord, RepoError> {
        let created_at = self.now();
        let mut tables = self.tables.lock().await;
        let order = match params.order {
            Some(order) => order,
            None => {
                tables
                    .chapters
                    .values()
                    .filter(|chapter| chapter.story_id == params.story_id)
                    .map(|chapter| chapter.order)
                    .max()
                    .unwrap_or(0)
                    + 1
            }
        };
        let chapter = ChapterRecord {
            id: Uuid::new_v4(),
            title: params.title,
            content: params.content,
            story_id: params.story_id,
            order,
            created_at,
        };
        tables.chapters.insert(chapter.id, chapter.clone());
        Ok(chapter)
    }

    async fn find_chapter(&self, id: Uuid) -> Result<Option<ChapterRecord>, RepoError> {
        Ok(self.tables.lock().await.chapters.get(&id).cloned())
    }

    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<ChapterRecord>, RepoError> {
        let mut chapters: Vec<ChapterRecord> = self
            .tables
            .lock()
            .await
            .chapters
            .values()
            .filter(|chapter| chapter.story_id == story_id)
            .cloned()
            .collect();
        chapters.sort_by_key(|chapter| (chapter.order, chapter.created_at));
        Ok(chapters)
    }

    async fn update_chapter(
        &self,
        params: UpdateChapterParams,
    ) -> Result<ChapterRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let chapter = tables
            .chapters
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        chapter.title = params.title;
        chapter.content = params.content;
        chapter.order = params.order;
        Ok(chapter.clone())
    }

    async fn delete_chapter(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let removed = tables.chapters.remove(&id).is_some();
        tables
            .comments
            .retain(|_, comment| comment.chapter_id != Some(id));
        Ok(removed)
    }

    async fn list_all_chapters(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<ChapterRecord>, RepoError> {
        let chapters: Vec<ChapterRecord> =
            self.tables.lock().await.chapters.values().cloned().collect();
        Ok(paginate(chapters, page))
    }
}

#[async_trait]
impl CommentsRepo for MemoryBackend {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let created_at = self.now();
        let comment = CommentRecord {
            id: Uuid::new_v4(),
            content: params.content,
            author_id: params.author_id,
            story_id: params.story_id,
            chapter_id: params.chapter_id,
            parent_id: params.parent_id,
            created_at,
            updated_at: created_at,
        };
        self.tables
            .lock()
            .await
            .comments
            .insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError> {
        Ok(self.tables.lock().await.comments.get(&id).cloned())
    }

    async fn update_comment(&self, id: Uuid, content: &str) -> Result<CommentRecord, RepoError> {
        let updated_at = self.now();
        let mut tables = self.tables.lock().await;
        let comment = tables.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
        comment.content = content.to_string();
        comment.updated_at = updated_at;
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.tables.lock().await.remove_comment(id))
    }

    async fn list_root_for_story(
        &self,
        story_id: Uuid,
    ) -> Result<Vec<CommentWithAuthor>, RepoError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<CommentWithAuthor> = tables
            .comments
            .values()
            .filter(|comment| comment.story_id == story_id && comment.parent_id.is_none())
            .map(|comment| tables.comment_with_author(comment))
            .collect();
        rows.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));
        Ok(rows)
    }

    async fn list_for_story(
        &self,
        story_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<CommentWithAuthor>, RepoError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<CommentWithAuthor> = tables
            .comments
            .values()
            .filter(|comment| comment.story_id == story_id)
            .map(|comment| tables.comment_with_author(comment))
            .collect();
        rows.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));
        Ok(paginate(rows, page))
    }

    async fn list_for_chapter(
        &self,
        chapter_id: Uuid,
    ) -> Result<Vec<CommentWithAuthor>, RepoError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<CommentWithAuthor> = tables
            .comments
            .values()
            .filter(|comment| comment.chapter_id == Some(chapter_id))
            .map(|comment| tables.comment_with_author(comment))
            .collect();
        rows.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));
        Ok(rows)
    }

    async fn thread(&self, root_id: Uuid) -> Result<Vec<CommentWithAuthor>, RepoError> {
        let tables = self.tables.lock().await;
        let mut ids = vec![root_id];
        let mut cursor = 0;
        while cursor < ids.len() {
            let parent = ids[cursor];
            ids.extend(
                tables
                    .comments
                    .values()
                    .filter(|comment| comment.parent_id == Some(parent))
                    .map(|comment| comment.id),
            );
            cursor += 1;
        }
        let mut rows: Vec<CommentWithAuthor> = ids
            .iter()
            .filter_map(|id| tables.comments.get(id))
            .map(|comment| tables.comment_with_author(comment))
            .collect();
        rows.sort_by_key(|row| row.comment.created_at);
        Ok(rows)
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let mut comments: Vec<CommentRecord> = self
            .tables
            .lock()
            .await
            .comments
            .values()
            .filter(|comment| comment.author_id == author_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    async fn list_all_comments(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<CommentRecord>, RepoError> {
        let comments: Vec<CommentRecord> =
            self.tables.lock().await.comments.values().cloned().collect();
        Ok(paginate(comments, page))
    }
}

#[async_trait]
impl RatingsRepo for MemoryBackend {
    async fn create_rating(
        &self,
        story_id: Uuid,
        author_id: Uuid,
        rate: i16,
    ) -> Result<RatingRecord, RepoError> {
        let created_at = self.now();
        let mut tables = self.tables.lock().await;
        if tables
            .ratings
            .values()
            .any(|rating| rating.story_id == story_id && rating.author_id == author_id)
        {
            return Err(duplicate("ratings_story_id_author_id_key"));
        }
        let rating = RatingRecord {
            id: Uuid::new_v4(),
            rate,
            author_id,
            story_id,
            created_at,
        };
        tables.ratings.insert(rating.id, rating.clone());
        Ok(rating)
    }

    async fn find_rating(&self, id: Uuid) -> Result<Option<RatingRecord>, RepoError> {
        Ok(self.tables.lock().await.ratings.get(&id).cloned())
    }

    async fn update_rating(&self, id: Uuid, rate: i16) -> Result<RatingRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let rating = tables.ratings.get_mut(&id).ok_or(RepoError::NotFound)?;
        rating.rate = rate;
        Ok(rating.clone())
    }

    async fn delete_rating(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.tables.lock().await.ratings.remove(&id).is_some())
    }

    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<RatingRecord>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .ratings
            .values()
            .filter(|rating| rating.story_id == story_id)
            .cloned()
            .collect())
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<RatingRecord>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .ratings
            .values()
            .filter(|rating| rating.author_id == author_id)
            .cloned()
            .collect())
    }

    async fn stats_for_story(&self, story_id: Uuid) -> Result<RatingStats, RepoError> {
        let tables = self.tables.lock().await;
        let rates: Vec<i64> = tables
            .ratings
            .values()
            .filter(|rating| rating.story_id == story_id)
            .map(|rating| i64::from(rating.rate))
            .collect();
        let count = rates.len() as i64;
        let sum: i64 = rates.iter().sum();
        Ok(RatingStats {
            count,
            sum,
            average: (count > 0).then(|| sum as f64 / count as f64),
        })
    }
}

#[async_trait]
impl TagsRepo for MemoryBackend {
    async fn create_tag(&self, name: &str, category: Option<&str>) -> Result<TagRecord, RepoError> {
        let created_at = self.now();
        let mut tables = self.tables.lock().await;
        if tables
            .tags
            .values()
            .any(|tag| tag.name.eq_ignore_ascii_case(name))
        {
            return Err(duplicate("tags_name_lower_key"));
        }
        let tag = TagRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: category.map(str::to_string),
            created_at,
        };
        tables.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn find_tag(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError> {
        Ok(self.tables.lock().await.tags.get(&id).cloned())
    }

    async fn find_tags(&self, ids: &[Uuid]) -> Result<Vec<TagRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(ids.iter().filter_map(|id| tables.tags.get(id).cloned()).collect())
    }

    async fn update_tag(
        &self,
        id: Uuid,
        name: &str,
        category: Option<&str>,
    ) -> Result<TagRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let tag = tables.tags.get_mut(&id).ok_or(RepoError::NotFound)?;
        tag.name = name.to_string();
        tag.category = category.map(str::to_string);
        Ok(tag.clone())
    }

    async fn delete_tag(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        tables.story_tags.retain(|(_, tag)| *tag != id);
        Ok(tables.tags.remove(&id).is_some())
    }

    async fn list_tags(&self, filter: &TagQueryFilter) -> Result<Vec<TagRecord>, RepoError> {
        let mut tags: Vec<TagRecord> = self
            .tables
            .lock()
            .await
            .tags
            .values()
            .filter(|tag| match &filter.search {
                Some(search) => tag.name.to_lowercase().contains(&search.to_lowercase()),
                None => true,
            })
            .filter(|tag| match &filter.category {
                Some(category) => tag.category.as_ref() == Some(category),
                None => true,
            })
            .cloned()
            .collect();
        sort_tags(&mut tags);
        Ok(tags)
    }

    async fn list_categories(&self) -> Result<Vec<String>, RepoError> {
        let mut categories: Vec<String> = self
            .tables
            .lock()
            .await
            .tags
            .values()
            .filter_map(|tag| tag.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<TagRecord>, RepoError> {
        Ok(self.tables.lock().await.tags_for_story(story_id))
    }

    async fn replace_story_tags(&self, story_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        tables.story_tags.retain(|(story, _)| *story != story_id);
        for tag_id in tag_ids {
            if !tables.story_tags.contains(&(story_id, *tag_id)) {
                tables.story_tags.push((story_id, *tag_id));
            }
        }
        Ok(())
    }

    async fn remove_story_tag(&self, story_id: Uuid, tag_id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.story_tags.len();
        tables.story_tags.retain(|link| *link != (story_id, tag_id));
        Ok(tables.story_tags.len() != before)
    }

    async fn clear_story_tags(&self, story_id: Uuid) -> Result<u64, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.story_tags.len();
        tables.story_tags.retain(|(story, _)| *story != story_id);
        Ok((before - tables.story_tags.len()) as u64)
    }

    async fn stories_with_tag(&self, tag_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .story_tags
            .iter()
            .filter(|(_, tag)| *tag == tag_id)
            .map(|(story, _)| *story)
            .collect())
    }
}

#[async_trait]
impl BookmarksRepo for MemoryBackend {
    async fn create_bookmark(
        &self,
        user_id: Uuid,
        story_id: Uuid,
    ) -> Result<BookmarkRecord, RepoError> {
        let created_at = self.now();
        let mut tables = self.tables.lock().await;
        if tables
            .bookmarks
            .values()
            .any(|b| b.user_id == user_id && b.story_id == story_id)
        {
            return Err(duplicate("bookmarks_user_id_story_id_key"));
        }
        let bookmark = BookmarkRecord {
            id: Uuid::new_v4(),
            user_id,
            story_id,
            created_at,
        };
        tables.bookmarks.insert(bookmark.id, bookmark.clone());
        Ok(bookmark)
    }

    async fn delete_bookmark(&self, user_id: Uuid, story_id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.bookmarks.len();
        tables
            .bookmarks
            .retain(|_, b| !(b.user_id == user_id && b.story_id == story_id));
        Ok(tables.bookmarks.len() != before)
    }

    async fn bookmark_exists(&self, user_id: Uuid, story_id: Uuid) -> Result<bool, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .bookmarks
            .values()
            .any(|b| b.user_id == user_id && b.story_id == story_id))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<BookmarkListItem>, RepoError> {
        let tables = self.tables.lock().await;
        let mut items: Vec<BookmarkListItem> = tables
            .bookmarks
            .values()
            .filter(|b| b.user_id == user_id)
            .filter_map(|b| {
                let story = tables.stories.get(&b.story_id)?;
                let latest_chapter = tables
                    .chapters
                    .values()
                    .filter(|chapter| chapter.story_id == story.id)
                    .max_by_key(|chapter| chapter.order)
                    .map(|chapter| LatestChapter {
                        id: chapter.id,
                        title: chapter.title.clone(),
                        order: chapter.order,
                    });
                Some(BookmarkListItem {
                    bookmark: b.clone(),
                    story_title: story.title.clone(),
                    story_author_id: story.author_id,
                    latest_chapter,
                })
            })
            .collect();
        items.sort_by(|a, b| b.bookmark.created_at.cmp(&a.bookmark.created_at));
        Ok(paginate(items, page))
    }
}

#[async_trait]
impl FollowsRepo for MemoryBackend {
    async fn create_follow(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<FollowRecord, RepoError> {
        let created_at = self.now();
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&follower_id) || !tables.users.contains_key(&following_id) {
            return Err(RepoError::InvalidInput {
                message: "insert or update on table \"follows\" violates foreign key constraint"
                    .to_string(),
            });
        }
        if tables
            .follows
            .values()
            .any(|f| f.follower_id == follower_id && f.following_id == following_id)
        {
            return Err(duplicate("follows_follower_id_following_id_key"));
        }
        let follow = FollowRecord {
            id: Uuid::new_v4(),
            follower_id,
            following_id,
            created_at,
        };
        tables.follows.insert(follow.id, follow.clone());
        Ok(follow)
    }

    async fn delete_follow(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|_, f| !(f.follower_id == follower_id && f.following_id == following_id));
        Ok(tables.follows.len() != before)
    }

    async fn follow_exists(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .follows
            .values()
            .any(|f| f.follower_id == follower_id && f.following_id == following_id))
    }

    async fn list_followers(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FollowUser>, RepoError> {
        let tables = self.tables.lock().await;
        let edges = tables
            .follows
            .values()
            .filter(|f| f.following_id == user_id)
            .map(|f| (f.follower_id, f.created_at))
            .collect();
        Ok(tables.follow_users(edges, page))
    }

    async fn list_following(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FollowUser>, RepoError> {
        let tables = self.tables.lock().await;
        let edges = tables
            .follows
            .values()
            .filter(|f| f.follower_id == user_id)
            .map(|f| (f.following_id, f.created_at))
            .collect();
        Ok(tables.follow_users(edges, page))
    }

    async fn follow_stats(&self, user_id: Uuid) -> Result<FollowStats, RepoError> {
        let tables = self.tables.lock().await;
        Ok(FollowStats {
            followers: tables
                .follows
                .values()
                .filter(|f| f.following_id == user_id)
                .count() as u64,
            following: tables
                .follows
                .values()
                .filter(|f| f.follower_id == user_id)
                .count() as u64,
        })
    }
}

#[async_trait]
impl ActivityRepo for MemoryBackend {
    async fn append_activity(&self, activity: NewActivity) -> Result<ActivityRecord, RepoError> {
        let created_at = self.now();
        let record = ActivityRecord {
            id: Uuid::new_v4(),
            user_id: activity.user_id,
            activity_type: activity.activity_type,
            story_id: activity.story_id,
            chapter_id: activity.chapter_id,
            metadata: activity.metadata,
            created_at,
        };
        self.tables.lock().await.activities.push(record.clone());
        Ok(record)
    }

    async fn feed_for_follower(
        &self,
        follower_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FeedItem>, RepoError> {
        let tables = self.tables.lock().await;
        let followed: Vec<Uuid> = tables
            .follows
            .values()
            .filter(|f| f.follower_id == follower_id)
            .map(|f| f.following_id)
            .collect();
        let mut items: Vec<FeedItem> = tables
            .activities
            .iter()
            .filter(|activity| followed.contains(&activity.user_id))
            .map(|activity| FeedItem {
                activity: activity.clone(),
                actor_username: tables.username(activity.user_id),
                story_title: activity
                    .story_id
                    .and_then(|id| tables.stories.get(&id))
                    .map(|story| story.title.clone()),
                chapter_title: activity
                    .chapter_id
                    .and_then(|id| tables.chapters.get(&id))
                    .map(|chapter| chapter.title.clone()),
            })
            .collect();
        items.sort_by(|a, b| b.activity.created_at.cmp(&a.activity.created_at));
        Ok(paginate(items, page))
    }
}

#[async_trait]
impl ReadHistoryRepo for MemoryBackend {
    async fn record_read(
        &self,
        user_id: Uuid,
        story_id: Uuid,
        chapter_id: Option<Uuid>,
    ) -> Result<ReadHistoryRecord, RepoError> {
        let read_at = self.now();
        let mut tables = self.tables.lock().await;
        let record = tables
            .read_history
            .entry((story_id, user_id))
            .or_insert_with(|| ReadHistoryRecord {
                id: Uuid::new_v4(),
                user_id,
                story_id,
                chapter_id: None,
                read_at,
            });
        record.read_at = read_at;
        if chapter_id.is_some() {
            record.chapter_id = chapter_id;
        }
        Ok(record.clone())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ReadHistoryItem>, RepoError> {
        let tables = self.tables.lock().await;
        let mut items: Vec<ReadHistoryItem> = tables
            .read_history
            .values()
            .filter(|record| record.user_id == user_id)
            .map(|record| tables.history_item(record))
            .collect();
        items.sort_by(|a, b| b.record.read_at.cmp(&a.record.read_at));
        Ok(items)
    }

    async fn find_for_story(
        &self,
        user_id: Uuid,
        story_id: Uuid,
    ) -> Result<Option<ReadHistoryItem>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .read_history
            .get(&(story_id, user_id))
            .map(|record| tables.history_item(record)))
    }
}

#[async_trait]
impl CollectionsRepo for MemoryBackend {
    async fn create_collection(
        &self,
        params: CreateCollectionParams,
    ) -> Result<CollectionRecord, RepoError> {
        let created_at = self.now();
        let collection = CollectionRecord {
            id: Uuid::new_v4(),
            name: params.name,
            description: params.description,
            owner_id: params.owner_id,
            is_public: params.is_public,
            created_at,
            updated_at: created_at,
        };
        self.tables
            .lock()
            .await
            .collections
            .insert(collection.id, collection.clone());
        Ok(collection)
    }

    async fn find_collection(&self, id: Uuid) -> Result<Option<CollectionRecord>, RepoError> {
        Ok(self.tables.lock().await.collections.get(&id).cloned())
    }

    async fn update_collection(
        &self,
        params: UpdateCollectionParams,
    ) -> Result<CollectionRecord, RepoError> {
        let updated_at = self.now();
        let mut tables = self.tables.lock().await;
        let collection = tables
            .collections
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        collection.name = params.name;
        collection.description = params.description;
        collection.is_public = params.is_public;
        collection.updated_at = updated_at;
        Ok(collection.clone())
    }

    async fn delete_collection(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        tables.collaborators.retain(|(collection, _)| *collection != id);
        tables
            .collection_stories
            .retain(|(collection, ..)| *collection != id);
        Ok(tables.collections.remove(&id).is_some())
    }

    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<CollectionRecord>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .collections
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_public(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<CollectionRecord>, RepoError> {
        let collections: Vec<CollectionRecord> = self
            .tables
            .lock()
            .await
            .collections
            .values()
            .filter(|c| c.is_public)
            .cloned()
            .collect();
        Ok(paginate(collections, page))
    }

    async fn is_collaborator(&self, collection_id: Uuid, user_id: Uuid) -> Result<bool, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .collaborators
            .contains(&(collection_id, user_id)))
    }

    async fn add_collaborator(&self, collection_id: Uuid, user_id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.collaborators.contains(&(collection_id, user_id)) {
            return Ok(false);
        }
        tables.collaborators.push((collection_id, user_id));
        Ok(true)
    }

    async fn remove_collaborator(
        &self,
        collection_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.collaborators.len();
        tables
            .collaborators
            .retain(|link| *link != (collection_id, user_id));
        Ok(tables.collaborators.len() != before)
    }

    async fn add_story(&self, collection_id: Uuid, story_id: Uuid) -> Result<bool, RepoError> {
        let added_at = self.now();
        let mut tables = self.tables.lock().await;
        let entries = &tables.collection_stories;
        if entries
            .iter()
            .any(|(c, s, ..)| *c == collection_id && *s == story_id)
        {
            return Ok(false);
        }
        let order = entries
            .iter()
            .filter(|(c, ..)| *c == collection_id)
            .map(|(_, _, order, _)| *order)
            .max()
            .unwrap_or(0)
            + 1;
        tables
            .collection_stories
            .push((collection_id, story_id, order, added_at));
        Ok(true)
    }

    async fn remove_story(&self, collection_id: Uuid, story_id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.collection_stories.len();
        tables
            .collection_stories
            .retain(|(c, s, ..)| !(*c == collection_id && *s == story_id));
        Ok(tables.collection_stories.len() != before)
    }

    async fn list_stories(
        &self,
        collection_id: Uuid,
    ) -> Result<Vec<CollectionStoryItem>, RepoError> {
        let tables = self.tables.lock().await;
        let mut items: Vec<CollectionStoryItem> = tables
            .collection_stories
            .iter()
            .filter(|(c, ..)| *c == collection_id)
            .filter_map(|(_, story_id, order, added_at)| {
                let story = tables.stories.get(story_id)?;
                Some(CollectionStoryItem {
                    story_id: story.id,
                    title: story.title.clone(),
                    author_id: story.author_id,
                    is_private: story.is_private,
                    order: *order,
                    added_at: *added_at,
                })
            })
            .collect();
        items.sort_by_key(|item| item.order);
        Ok(items)
    }
}

#[async_trait]
impl MessagesRepo for MemoryBackend {
    async fn send_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<MessageRecord, RepoError> {
        let created_at = self.now();
        let message = MessageRecord {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            is_read: false,
            deleted_by_sender: false,
            deleted_by_receiver: false,
            created_at,
        };
        self.tables
            .lock()
            .await
            .messages
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<MessageRecord>, RepoError> {
        Ok(self.tables.lock().await.messages.get(&id).cloned())
    }

    async fn list_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, RepoError> {
        let tables = self.tables.lock().await;
        let mut latest: HashMap<Uuid, MessageRecord> = HashMap::new();
        for message in tables.messages.values().filter(|m| visible_to(m, user_id)) {
            let other = if message.sender_id == user_id {
                message.receiver_id
            } else {
                message.sender_id
            };
            let keep = latest
                .get(&other)
                .is_none_or(|current| current.created_at < message.created_at);
            if keep {
                latest.insert(other, message.clone());
            }
        }
        let mut summaries: Vec<ConversationSummary> = latest
            .into_iter()
            .map(|(other, last_message)| ConversationSummary {
                other_user_id: other,
                other_username: tables.username(other),
                unread_count: tables
                    .messages
                    .values()
                    .filter(|m| m.sender_id == other && m.receiver_id == user_id && !m.is_read)
                    .filter(|m| !m.deleted_by_receiver)
                    .count() as i64,
                last_message,
            })
            .collect();
        summaries.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
        Ok(summaries)
    }

    async fn history(
        &self,
        user_id: Uuid,
        other_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<MessageRecord>, RepoError> {
        let mut messages: Vec<MessageRecord> = self
            .tables
            .lock()
            .await
            .messages
            .values()
            .filter(|m| {
                (m.sender_id == user_id && m.receiver_id == other_id)
                    || (m.sender_id == other_id && m.receiver_id == user_id)
            })
            .filter(|m| visible_to(m, user_id))
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(messages, page))
    }

    async fn mark_read(&self, user_id: Uuid, other_id: Uuid) -> Result<u64, RepoError> {
        let mut tables = self.tables.lock().await;
        let mut changed = 0;
        for message in tables.messages.values_mut() {
            if message.sender_id == other_id && message.receiver_id == user_id && !message.is_read {
                message.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn soft_delete(&self, id: Uuid, user_id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let Some(message) = tables.messages.get_mut(&id) else {
            return Ok(false);
        };
        if message.sender_id == user_id {
            message.deleted_by_sender = true;
        } else if message.receiver_id == user_id {
            message.deleted_by_receiver = true;
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .messages
            .values()
            .filter(|m| m.receiver_id == user_id && !m.is_read && !m.deleted_by_receiver)
            .count() as u64)
    }
}

fn visible_to(message: &MessageRecord, user_id: Uuid) -> bool {
    (message.sender_id == user_id && !message.deleted_by_sender)
        || (message.receiver_id == user_id && !message.deleted_by_receiver)
}

/// Activity repository whose writes always fail.
#[derive(Default)]
pub struct FailingActivityRepo;

#[async_trait]
impl ActivityRepo for FailingActivityRepo {
    async fn append_activity(&self, _activity: NewActivity) -> Result<ActivityRecord, RepoError> {
        Err(RepoError::Persistence("activity table unavailable".into()))
    }

    async fn feed_for_follower(
        &self,
        _follower_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<FeedItem>, RepoError> {
        Ok(Paginated::new(Vec::new(), 0, page))
    }
}

/// Cache store that records the order of operations and can fail deletes on demand.
pub struct RecordingStore {
    inner: MemoryCacheStore,
    log: Mutex<Vec<String>>,
    fail_deletes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCacheStore::new(&CacheConfig::default()),
            log: Mutex::new(Vec::new()),
            fail_deletes: AtomicBool::new(false),
        })
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn log(&self) -> Vec<String> {
        self.log.lock().await.clone()
    }

    pub async fn contains(&self, key: &str) -> bool {
        matches!(self.get(key).await, Ok(Some(_)))
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.log.lock().await.push(format!("set {key}"));
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.log.lock().await.push(format!("delete {key}"));
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("delete refused".into()));
        }
        self.inner.delete(key).await
    }
}

/// Services wired over one in-memory backend and one recording cache.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub store: Arc<RecordingStore>,
    pub stories: StoryService,
    pub chapters: ChapterService,
    pub comments: CommentService,
    pub ratings: RatingService,
    pub users: UserService,
    pub follows: FollowService,
    pub activity: ActivityService,
    pub trigger: CacheTrigger,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_activity_repo(None)
    }

    /// Same wiring, with activity writes going to a repository that always fails.
    pub fn with_failing_activity() -> Self {
        Self::with_activity_repo(Some(Arc::new(FailingActivityRepo)))
    }

    fn with_activity_repo(activity_repo: Option<Arc<dyn ActivityRepo>>) -> Self {
        let backend = MemoryBackend::new();
        let store = RecordingStore::new();
        let repos = Repositories::from_backend(backend.clone());
        let builder = ReadModelBuilder::new(
            repos.stories.clone(),
            repos.chapters.clone(),
            repos.comments.clone(),
            repos.tags.clone(),
            repos.ratings.clone(),
        );
        let trigger = CacheTrigger::new(
            &CacheConfig::default(),
            ViewCache::new(store.clone()),
            builder.clone(),
        );
        let activity = ActivityService::new(activity_repo.unwrap_or(repos.activity.clone()));

        Self {
            stories: StoryService::new(
                repos.stories.clone(),
                repos.chapters.clone(),
                repos.read_history.clone(),
                builder.clone(),
                trigger.clone(),
                activity.clone(),
            ),
            chapters: ChapterService::new(
                repos.stories.clone(),
                repos.chapters.clone(),
                repos.read_history.clone(),
                builder,
                trigger.clone(),
                activity.clone(),
            ),
            comments: CommentService::new(
                repos.stories.clone(),
                repos.chapters.clone(),
                repos.comments.clone(),
                trigger.clone(),
            ),
            ratings: RatingService::new(
                repos.stories.clone(),
                repos.ratings.clone(),
                trigger.clone(),
            ),
            users: UserService::new(
                repos.users.clone(),
                repos.stories.clone(),
                repos.chapters.clone(),
                repos.comments.clone(),
                repos.ratings.clone(),
                trigger.clone(),
            ),
            follows: FollowService::new(repos.users.clone(), repos.follows.clone()),
            trigger,
            activity,
            backend,
            store,
        }
    }
}

/// API state over in-memory repositories, for router-level tests.
pub fn memory_api_state() -> (ApiState, Arc<MemoryBackend>) {
    memory_api_state_with_limit(1000)
}

pub fn memory_api_state_with_limit(max_requests: u32) -> (ApiState, Arc<MemoryBackend>) {
    let backend = MemoryBackend::new();
    let state = ApiState::new(
        Repositories::from_backend(backend.clone()),
        Arc::new(MemoryCacheStore::new(&CacheConfig::default())),
        &CacheConfig::default(),
        TokenService::new(JWT_SECRET, Duration::from_secs(3600)),
        ApiRateLimiter::new(Duration::from_secs(60), max_requests),
    );
    (state, backend)
}

/// Let detached refresh and fan-out tasks run to completion.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}
