mod cache_sweep;

pub use cache_sweep::{
    CACHE_SWEEP_CRON, CacheSweepContext, CacheSweepJob, cache_sweep_schedule,
    process_cache_sweep_job,
};
