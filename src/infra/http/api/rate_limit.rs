use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::RateLimitSettings;

pub(crate) const METRIC_RATE_LIMITED_TOTAL: &str = "storytell_http_rate_limited_total";

/// Sliding-window limiter keyed by client identity.
///
/// Buckets with no request inside the window are swept at most once per
/// window, so the table stays bounded by the clients active in the last two
/// windows.
#[derive(Debug, Clone)]
pub struct ApiRateLimiter {
    window: Duration,
    max_requests: u32,
    trust_forwarded_for: bool,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
    last_sweep: Arc<Mutex<Instant>>,
}

impl ApiRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            trust_forwarded_for: false,
            buckets: Arc::new(DashMap::new()),
            last_sweep: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(
            Duration::from_secs(u64::from(settings.window_seconds.get())),
            settings.max_requests.get(),
        )
        .trusting_forwarded_for(settings.trust_forwarded_for)
    }

    pub fn trusting_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn trusts_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    /// Record a request for `key`; false once the window is full.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let window = self.window;
        self.sweep_if_due(now);

        let mut entry = self.buckets.entry(key.to_string()).or_default();
        entry.retain(|instant| now.duration_since(*instant) < window);

        if entry.len() >= self.max_requests as usize {
            return false;
        }

        entry.push(now);
        true
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets whose requests have all left the window.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        self.purge_idle_at(now)
    }

    fn purge_idle_at(&self, now: Instant) -> usize {
        let window = self.window;
        let before = self.buckets.len();
        self.buckets.retain(|_, instants| {
            instants
                .last()
                .is_some_and(|last| now.duration_since(*last) < window)
        });
        before.saturating_sub(self.buckets.len())
    }

    fn sweep_if_due(&self, now: Instant) {
        // A concurrent sweep is as good as ours.
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last) < self.window {
            return;
        }
        *last = now;
        drop(last);
        self.purge_idle_at(now);
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }
}
