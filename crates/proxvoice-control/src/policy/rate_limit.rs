//! Fixed-window request limiter for the ingestion endpoints.
//!
//! Bursts of up to `2 * max` around a window boundary are possible; this is
//! accepted at this traffic scale in exchange for a trivially cheap check.
//!
//! Concurrency note: the window check and update for one key happen under the
//! key's `DashMap` entry lock, so concurrent callers never over-admit. When
//! the map grows past `MAX_TRACKED_KEYS`, expired windows are trimmed inline.

use dashmap::DashMap;

/// Trim threshold for tracked keys.
const MAX_TRACKED_KEYS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    start_ms: u64,
    window_ms: u64,
    count: u32,
}

impl Window {
    fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.start_ms) >= self.window_ms
    }
}

/// Keyed fixed-window counter (`<bucket>:<caller identity>` -> window).
#[derive(Debug, Default)]
pub struct FixedWindowRateLimiter {
    windows: DashMap<String, Window>,
}

impl FixedWindowRateLimiter {
    pub fn new() -> Self {
        Self { windows: DashMap::new() }
    }

    /// Count one call against `key`. A denied call leaves state untouched.
    pub fn allow(&self, key: &str, max_per_window: u32, window_ms: u64, now_ms: u64) -> bool {
        let allowed = {
            let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
                start_ms: now_ms,
                window_ms,
                count: 0,
            });
            let w = entry.value_mut();

            if w.count == 0 || w.expired(now_ms) {
                *w = Window { start_ms: now_ms, window_ms, count: 1 };
                true
            } else if w.count < max_per_window {
                w.count += 1;
                true
            } else {
                false
            }
        };

        if self.windows.len() > MAX_TRACKED_KEYS {
            self.purge_expired(now_ms);
        }

        allowed
    }

    /// Forget every window that has already closed.
    pub fn purge_expired(&self, now_ms: u64) {
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.expired(now_ms));
        tracing::debug!(before, after = self.windows.len(), "rate limiter windows trimmed");
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
