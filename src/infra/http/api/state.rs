use std::sync::Arc;

use crate::application::activity::ActivityService;
use crate::application::admin::AdminService;
use crate::application::auth::{AuthService, TokenService};
use crate::application::bookmarks::BookmarkService;
use crate::application::chapters::ChapterService;
use crate::application::collections::CollectionService;
use crate::application::comments::CommentService;
use crate::application::export::ExportService;
use crate::application::follows::FollowService;
use crate::application::messages::MessageService;
use crate::application::ratings::RatingService;
use crate::application::read_history::ReadHistoryService;
use crate::application::read_model::ReadModelBuilder;
use crate::application::repos::Repositories;
use crate::application::stories::StoryService;
use crate::application::tags::TagService;
use crate::application::users::UserService;
use crate::cache::{CacheConfig, CacheStore, CacheTrigger, ViewCache};
use crate::infra::db::PostgresRepositories;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub users: Arc<UserService>,
    pub stories: Arc<StoryService>,
    pub chapters: Arc<ChapterService>,
    pub comments: Arc<CommentService>,
    pub ratings: Arc<RatingService>,
    pub follows: Arc<FollowService>,
    pub activity: Arc<ActivityService>,
    pub tags: Arc<TagService>,
    pub bookmarks: Arc<BookmarkService>,
    pub read_history: Arc<ReadHistoryService>,
    pub collections: Arc<CollectionService>,
    pub messages: Arc<MessageService>,
    pub admin: Arc<AdminService>,
    pub export: Arc<ExportService>,
    /// Used by `/health`; absent when the state is backed by non-Postgres repositories.
    pub db: Option<Arc<PostgresRepositories>>,
    pub rate_limiter: Arc<ApiRateLimiter>,
}

impl ApiState {
    /// Wire every service over `repos`, sharing one view cache and one activity publisher.
    pub fn new(
        repos: Repositories,
        cache_store: Arc<dyn CacheStore>,
        cache_config: &CacheConfig,
        tokens: TokenService,
        rate_limiter: ApiRateLimiter,
    ) -> Self {
        let builder = ReadModelBuilder::new(
            repos.stories.clone(),
            repos.chapters.clone(),
            repos.comments.clone(),
            repos.tags.clone(),
            repos.ratings.clone(),
        );
        let trigger = CacheTrigger::new(cache_config, ViewCache::new(cache_store), builder.clone());
        let activity = ActivityService::new(repos.activity.clone());

        Self {
            auth: Arc::new(AuthService::new(repos.users.clone(), tokens)),
            users: Arc::new(UserService::new(
                repos.users.clone(),
                repos.stories.clone(),
                repos.chapters.clone(),
                repos.comments.clone(),
                repos.ratings.clone(),
                trigger.clone(),
            )),
            stories: Arc::new(StoryService::new(
                repos.stories.clone(),
                repos.chapters.clone(),
                repos.read_history.clone(),
                builder.clone(),
                trigger.clone(),
                activity.clone(),
            )),
            chapters: Arc::new(ChapterService::new(
                repos.stories.clone(),
                repos.chapters.clone(),
                repos.read_history.clone(),
                builder,
                trigger.clone(),
                activity.clone(),
            )),
            comments: Arc::new(CommentService::new(
                repos.stories.clone(),
                repos.chapters.clone(),
                repos.comments.clone(),
                trigger.clone(),
            )),
            ratings: Arc::new(RatingService::new(
                repos.stories.clone(),
                repos.ratings.clone(),
                trigger.clone(),
            )),
            follows: Arc::new(FollowService::new(
                repos.users.clone(),
                repos.follows.clone(),
            )),
            activity: Arc::new(activity),
            tags: Arc::new(TagService::new(
                repos.stories.clone(),
                repos.tags.clone(),
                trigger,
            )),
            bookmarks: Arc::new(BookmarkService::new(
                repos.stories.clone(),
                repos.bookmarks.clone(),
            )),
            read_history: Arc::new(ReadHistoryService::new(repos.read_history.clone())),
            collections: Arc::new(CollectionService::new(
                repos.collections.clone(),
                repos.stories.clone(),
                repos.users.clone(),
            )),
            messages: Arc::new(MessageService::new(
                repos.users.clone(),
                repos.messages.clone(),
            )),
            admin: Arc::new(AdminService::new(
                repos.users.clone(),
                repos.stories.clone(),
                repos.chapters.clone(),
                repos.comments.clone(),
            )),
            export: Arc::new(ExportService::new(
                repos.users,
                repos.stories,
                repos.chapters,
                repos.bookmarks,
                repos.ratings,
                repos.follows,
                repos.read_history,
            )),
            db: None,
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    pub fn with_database(mut self, db: Arc<PostgresRepositories>) -> Self {
        self.db = Some(db);
        self
    }
}
