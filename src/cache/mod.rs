//! Read-model cache.
//!
//! Story and chapter views are cached under deterministic string keys in a
//! [`CacheStore`] with a process-wide TTL and capacity. Writes follow an
//! invalidate-then-refresh protocol driven by [`CacheTrigger`]; reads go
//! through [`ViewCache`], which never lets a cache fault fail a request.
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 300
//! capacity = 1000
//! ```

mod config;
mod keys;
mod lock;
mod store;
mod trigger;
mod views;

pub use config::CacheConfig;
pub use keys::CacheKey;
pub use store::{CacheError, CacheStore, MemoryCacheStore, NoopCacheStore};
pub use trigger::{CacheTrigger, InvalidationMode};
pub use views::ViewCache;

pub(crate) use store::METRIC_CACHE_EVICT_TOTAL;
pub(crate) use trigger::{METRIC_CACHE_REFRESH_FAILED_TOTAL, METRIC_CACHE_REFRESH_MS};
pub(crate) use views::{METRIC_CACHE_ERROR_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL};
