//! Write-side cache protocol.
//!
//! After a store mutation commits, services call into the trigger which
//! deletes the affected keys synchronously and then schedules a detached
//! rebuild. The rebuild is never awaited by the caller and never retried; a
//! later read miss rebuilds on demand anyway.
//!
//! Concurrent refreshes of the same key are not serialized. The last one to
//! finish wins, which is acceptable for a point-in-time snapshot bounded by
//! the TTL.

use std::time::Instant;

use metrics::{counter, histogram};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::store::CacheError;
use super::views::ViewCache;
use crate::application::error::ServiceError;
use crate::application::read_model::ReadModelBuilder;

pub(crate) const METRIC_CACHE_REFRESH_MS: &str = "storytell_cache_refresh_ms";
pub(crate) const METRIC_CACHE_REFRESH_FAILED_TOTAL: &str = "storytell_cache_refresh_failed_total";

/// How a failed key deletion is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationMode {
    /// The stale entry could expose private data; the failure fails the write.
    Strict,
    /// Staleness only costs freshness; the failure is logged.
    BestEffort,
}

#[derive(Clone)]
pub struct CacheTrigger {
    enabled: bool,
    cache: ViewCache,
    builder: ReadModelBuilder,
}

impl CacheTrigger {
    pub fn new(config: &CacheConfig, cache: ViewCache, builder: ReadModelBuilder) -> Self {
        Self {
            enabled: config.enabled,
            cache,
            builder,
        }
    }

    pub fn cache(&self) -> &ViewCache {
        &self.cache
    }

    /// Delete every key. Absent keys are not an error.
    pub async fn invalidate(
        &self,
        keys: &[CacheKey],
        mode: InvalidationMode,
    ) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }

        for key in keys {
            let rendered = key.to_string();
            match self.cache.store().delete(&rendered).await {
                Ok(()) => {
                    debug!(target = "storytell::cache", cache_key = %rendered, "invalidated");
                }
                Err(err) if mode == InvalidationMode::Strict => {
                    warn!(
                        target = "storytell::cache",
                        cache_key = %rendered,
                        error = %err,
                        "strict invalidation failed"
                    );
                    return Err(err);
                }
                Err(err) => {
                    counter!(super::views::METRIC_CACHE_ERROR_TOTAL, "op" => "delete")
                        .increment(1);
                    warn!(
                        target = "storytell::cache",
                        cache_key = %rendered,
                        error = %err,
                        "invalidation failed; entry may stay stale until TTL"
                    );
                }
            }
        }
        Ok(())
    }

    /// Schedule a detached rebuild of `key`.
    ///
    /// The returned handle may be dropped; holding it does not change behavior.
    pub fn refresh(&self, key: CacheKey) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }

        let cache = self.cache.clone();
        let builder = self.builder.clone();
        Some(tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match key {
                CacheKey::Story(id) => match builder.build_story_view(id).await {
                    Ok(view) => {
                        cache.put_story_view(&view).await;
                        Ok(())
                    }
                    Err(err) => Err(err),
                },
                CacheKey::Chapter(id) => match builder.build_chapter_view(id).await {
                    Ok(view) => {
                        cache.put_chapter_view(&view).await;
                        Ok(())
                    }
                    Err(err) => Err(err),
                },
            };

            match outcome {
                Ok(()) => {
                    histogram!(METRIC_CACHE_REFRESH_MS, "kind" => key.kind())
                        .record(started.elapsed().as_secs_f64() * 1000.0);
                    debug!(
                        target = "storytell::cache",
                        cache_key = %key,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "refreshed"
                    );
                }
                Err(ServiceError::NotFound(_)) => {
                    debug!(
                        target = "storytell::cache",
                        cache_key = %key,
                        "refresh skipped: aggregate no longer exists"
                    );
                }
                Err(err) => {
                    counter!(METRIC_CACHE_REFRESH_FAILED_TOTAL, "kind" => key.kind()).increment(1);
                    warn!(
                        target = "storytell::cache",
                        cache_key = %key,
                        error = %err,
                        "refresh failed"
                    );
                }
            }
        }))
    }

    /// A story or one of its story-scoped children changed.
    pub async fn story_changed(
        &self,
        story_id: Uuid,
        mode: InvalidationMode,
    ) -> Result<(), CacheError> {
        let key = CacheKey::Story(story_id);
        self.invalidate(&[key], mode).await?;
        self.refresh(key);
        Ok(())
    }

    /// A chapter or one of its children changed; the parent story view lists it too.
    pub async fn chapter_changed(
        &self,
        story_id: Uuid,
        chapter_id: Uuid,
        mode: InvalidationMode,
    ) -> Result<(), CacheError> {
        let story = CacheKey::Story(story_id);
        let chapter = CacheKey::Chapter(chapter_id);
        self.invalidate(&[story, chapter], mode).await?;
        self.refresh(story);
        self.refresh(chapter);
        Ok(())
    }

    /// The story view and each listed chapter view changed; all are rebuilt.
    pub async fn views_changed(
        &self,
        story_id: Uuid,
        chapter_ids: &[Uuid],
        mode: InvalidationMode,
    ) -> Result<(), CacheError> {
        let keys = story_keys(story_id, chapter_ids);
        self.invalidate(&keys, mode).await?;
        for key in keys {
            self.refresh(key);
        }
        Ok(())
    }

    /// Story flipped visibility: every chapter view embeds the flag.
    pub async fn story_visibility_changed(
        &self,
        story_id: Uuid,
        chapter_ids: &[Uuid],
    ) -> Result<(), CacheError> {
        self.views_changed(story_id, chapter_ids, InvalidationMode::Strict)
            .await
    }

    /// The story is gone; nothing is rebuilt.
    pub async fn story_removed(
        &self,
        story_id: Uuid,
        chapter_ids: &[Uuid],
    ) -> Result<(), CacheError> {
        self.invalidate(&story_keys(story_id, chapter_ids), InvalidationMode::Strict)
            .await
    }

    /// The chapter is gone; only the parent story is rebuilt.
    pub async fn chapter_removed(&self, story_id: Uuid, chapter_id: Uuid) -> Result<(), CacheError> {
        let story = CacheKey::Story(story_id);
        self.invalidate(
            &[story, CacheKey::Chapter(chapter_id)],
            InvalidationMode::Strict,
        )
        .await?;
        self.refresh(story);
        Ok(())
    }
}

fn story_keys(story_id: Uuid, chapter_ids: &[Uuid]) -> Vec<CacheKey> {
    std::iter::once(CacheKey::Story(story_id))
        .chain(chapter_ids.iter().copied().map(CacheKey::Chapter))
        .collect()
}
