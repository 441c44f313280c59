//! Typed access to cached story and chapter views.
//!
//! Every cache failure is logged and swallowed here so that readers degrade
//! to store-only reads.

use std::sync::Arc;

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use uuid::Uuid;

use super::keys::CacheKey;
use super::store::{CacheError, CacheStore};
use crate::application::read_model::{ChapterView, StoryView};

pub(crate) const METRIC_CACHE_HIT_TOTAL: &str = "storytell_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS_TOTAL: &str = "storytell_cache_miss_total";
pub(crate) const METRIC_CACHE_ERROR_TOTAL: &str = "storytell_cache_error_total";

#[derive(Clone)]
pub struct ViewCache {
    store: Arc<dyn CacheStore>,
}

impl ViewCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub async fn story_view(&self, story_id: Uuid) -> Option<StoryView> {
        self.get(CacheKey::Story(story_id)).await
    }

    pub async fn chapter_view(&self, chapter_id: Uuid) -> Option<ChapterView> {
        self.get(CacheKey::Chapter(chapter_id)).await
    }

    pub async fn put_story_view(&self, view: &StoryView) {
        self.put(CacheKey::Story(view.id), view).await;
    }

    pub async fn put_chapter_view(&self, view: &ChapterView) {
        self.put(CacheKey::Chapter(view.id), view).await;
    }

    async fn get<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let key = key.to_string();
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
                debug!(target = "storytell::cache", cache_key = %key, "cache miss");
                return None;
            }
            Err(err) => {
                record_failure(&key, "get", &err);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
                Some(value)
            }
            Err(err) => {
                record_failure(&key, "decode", &CacheError::from(err));
                // A value that no longer decodes would otherwise be served as a miss until TTL.
                if let Err(err) = self.store.delete(&key).await {
                    record_failure(&key, "delete", &err);
                }
                None
            }
        }
    }

    async fn put<T: Serialize>(&self, key: CacheKey, value: &T) {
        let key = key.to_string();
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                record_failure(&key, "encode", &CacheError::from(err));
                return;
            }
        };
        if let Err(err) = self.store.set(&key, raw).await {
            record_failure(&key, "set", &err);
        }
    }
}

fn record_failure(key: &str, op: &'static str, err: &CacheError) {
    counter!(METRIC_CACHE_ERROR_TOTAL, "op" => op).increment(1);
    warn!(
        target = "storytell::cache",
        cache_key = %key,
        op,
        error = %err,
        "cache operation failed; falling back to store"
    );
}
