//! Cron job that drops expired entries from the in-memory view cache.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use apalis_cron::Schedule;

use crate::cache::MemoryCacheStore;
use crate::infra::error::InfraError;

/// Every minute, at second zero.
pub const CACHE_SWEEP_CRON: &str = "0 * * * * *";

/// Marker struct for the cron-triggered sweep.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct CacheSweepJob;

impl From<chrono::DateTime<chrono::Utc>> for CacheSweepJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct CacheSweepContext {
    pub store: Arc<MemoryCacheStore>,
}

pub async fn process_cache_sweep_job(
    _job: CacheSweepJob,
    ctx: Data<CacheSweepContext>,
) -> Result<(), apalis::prelude::Error> {
    let purged = ctx.store.purge_expired();
    if purged > 0 {
        tracing::info!(
            target = "storytell::jobs::cache_sweep",
            purged,
            remaining = ctx.store.len(),
            "purged expired cache entries"
        );
    }
    Ok(())
}

pub fn cache_sweep_schedule() -> Result<Schedule, InfraError> {
    Schedule::from_str(CACHE_SWEEP_CRON)
        .map_err(|err| InfraError::configuration(format!("invalid cache sweep schedule: {err}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::{CacheConfig, CacheStore};

    #[test]
    fn schedule_fires_every_minute() {
        let schedule = cache_sweep_schedule().expect("valid schedule");
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(2).collect();
        assert_eq!(upcoming.len(), 2);
        assert_eq!((upcoming[1] - upcoming[0]).num_seconds(), 60);
    }

    #[tokio::test]
    async fn job_purges_expired_entries() {
        let store = Arc::new(MemoryCacheStore::new(&CacheConfig {
            enabled: true,
            ttl: Duration::ZERO,
            capacity: 8,
        }));
        store.set("story-a", "{}".into()).await.expect("set");
        assert_eq!(store.len(), 1);

        process_cache_sweep_job(
            CacheSweepJob,
            Data::new(CacheSweepContext {
                store: store.clone(),
            }),
        )
        .await
        .expect("sweep");
        assert!(store.is_empty());
    }
}
