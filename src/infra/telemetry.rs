use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::activity::METRIC_ACTIVITY_FAILED_TOTAL;
use crate::cache::{
    METRIC_CACHE_ERROR_TOTAL, METRIC_CACHE_EVICT_TOTAL, METRIC_CACHE_HIT_TOTAL,
    METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_REFRESH_FAILED_TOTAL, METRIC_CACHE_REFRESH_MS,
};
use crate::config::{LogFormat, LoggingSettings};
use crate::infra::http::METRIC_RATE_LIMITED_TOTAL;

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Total number of view cache hits."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Total number of view cache misses."
        );
        describe_counter!(
            METRIC_CACHE_EVICT_TOTAL,
            Unit::Count,
            "Total number of view cache evictions due to capacity."
        );
        describe_counter!(
            METRIC_CACHE_ERROR_TOTAL,
            Unit::Count,
            "Cache operations that failed and were swallowed."
        );
        describe_counter!(
            METRIC_CACHE_REFRESH_FAILED_TOTAL,
            Unit::Count,
            "Background view rebuilds that failed."
        );
        describe_histogram!(
            METRIC_CACHE_REFRESH_MS,
            Unit::Milliseconds,
            "Background view rebuild latency in milliseconds."
        );
        describe_counter!(
            METRIC_ACTIVITY_FAILED_TOTAL,
            Unit::Count,
            "Activity feed writes that failed after the triggering request succeeded."
        );
        describe_counter!(
            METRIC_RATE_LIMITED_TOTAL,
            Unit::Count,
            "Requests rejected by the per-client rate limiter."
        );
    });
}
