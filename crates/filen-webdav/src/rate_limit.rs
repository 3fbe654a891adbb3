//! Fixed-window request rate limiting.
//!
//! Runs in front of authentication. Windows are keyed by client IP or, when
//! configured, by the username claimed in the auth header (extraction only:
//! a wrong password still consumes budget, which is the point).

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Window {
    start: Instant,
    count: u64,
}

/// Fixed-window counter per key.
pub struct RateLimiter {
    window: Duration,
    limit: u64,
    buckets: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: Duration::from_millis(config.window_ms.max(1)),
            limit: config.limit,
            buckets: DashMap::new(),
        }
    }

    /// Record a hit for `key`. Returns false when the key is over budget for
    /// the current window.
    pub fn check(&self, key: &str) -> bool {
        if self.limit == 0 {
            return true;
        }
        let now = Instant::now();
        let mut entry = self.buckets.entry(key.to_string()).or_insert(Window {
            start: now,
            count: 0,
        });
        if now.duration_since(entry.start) >= self.window {
            entry.start = now;
            entry.count = 0;
        }
        entry.count += 1;
        entry.count <= self.limit
    }
}
