use std::sync::Arc;

use uuid::Uuid;

use crate::application::access::{load_story, load_visible_story, private_denied};
use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::repos::{RatingStats, RatingsRepo, StoriesRepo};
use crate::cache::{CacheTrigger, InvalidationMode};
use crate::domain::entities::RatingRecord;
use crate::domain::validation::validate_rate;

#[derive(Clone)]
pub struct RatingService {
    pub(crate) stories: Arc<dyn StoriesRepo>,
    pub(crate) ratings: Arc<dyn RatingsRepo>,
    pub(crate) cache: CacheTrigger,
}

impl RatingService {
    pub fn new(
        stories: Arc<dyn StoriesRepo>,
        ratings: Arc<dyn RatingsRepo>,
        cache: CacheTrigger,
    ) -> Self {
        Self {
            stories,
            ratings,
            cache,
        }
    }

    /// One rating per reader and story; authors cannot rate their own work.
    ///
    /// Uniqueness is enforced by the store so that concurrent requests
    /// cannot both succeed.
    pub async fn create_rating(
        &self,
        principal: &Principal,
        story_id: Uuid,
        rate: i64,
    ) -> Result<RatingRecord, ServiceError> {
        let rate = validate_rate(rate)?;
        let story = load_story(self.stories.as_ref(), story_id).await?;
        if story.author_id == principal.id {
            return Err(ServiceError::bad_request("authors cannot rate their own story"));
        }
        if !story.visible_to(Some(principal.id)) {
            return Err(private_denied(Some(principal.id)));
        }

        let rating = self
            .ratings
            .create_rating(story_id, principal.id, rate)
            .await
            .map_err(ServiceError::conflict_on_duplicate("story already rated"))?;

        self.cache
            .story_changed(story_id, InvalidationMode::BestEffort)
            .await?;
        Ok(rating)
    }

    pub async fn update_rating(
        &self,
        principal: &Principal,
        rating_id: Uuid,
        rate: i64,
    ) -> Result<RatingRecord, ServiceError> {
        let rate = validate_rate(rate)?;
        let rating = self
            .ratings
            .find_rating(rating_id)
            .await?
            .ok_or(ServiceError::NotFound("rating"))?;
        if rating.author_id != principal.id {
            return Err(ServiceError::Forbidden("only the owner may change this rating"));
        }

        let updated = self
            .ratings
            .update_rating(rating_id, rate)
            .await
            .map_err(ServiceError::not_found_on_missing("rating"))?;
        self.cache
            .story_changed(updated.story_id, InvalidationMode::BestEffort)
            .await?;
        Ok(updated)
    }

    /// Someone else's rating reads as missing.
    pub async fn delete_rating(
        &self,
        principal: &Principal,
        rating_id: Uuid,
    ) -> Result<(), ServiceError> {
        let rating = self
            .ratings
            .find_rating(rating_id)
            .await?
            .filter(|rating| rating.author_id == principal.id)
            .ok_or(ServiceError::NotFound("rating"))?;

        if !self.ratings.delete_rating(rating_id).await? {
            return Err(ServiceError::NotFound("rating"));
        }
        self.cache
            .story_changed(rating.story_id, InvalidationMode::BestEffort)
            .await?;
        Ok(())
    }

    pub async fn list_story_ratings(
        &self,
        viewer: Option<Uuid>,
        story_id: Uuid,
    ) -> Result<Vec<RatingRecord>, ServiceError> {
        load_visible_story(self.stories.as_ref(), story_id, viewer).await?;
        Ok(self.ratings.list_for_story(story_id).await?)
    }

    pub async fn rating_stats(
        &self,
        viewer: Option<Uuid>,
        story_id: Uuid,
    ) -> Result<RatingStats, ServiceError> {
        load_visible_story(self.stories.as_ref(), story_id, viewer).await?;
        Ok(self.ratings.stats_for_story(story_id).await?)
    }
}
