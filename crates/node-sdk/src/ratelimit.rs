//! Durable rolling-window rate limiter.
//!
//! Counts task-consuming messages against a per-window quota, persisting
//! `(window_start, count)` through the settings store so restarts don't
//! reset consumption. Assumes a single writer: there is one dispatch path
//! per process.

use std::sync::Arc;

use chrono::Utc;

use crate::store::{SettingsStore, KEY_RATE_COUNT, KEY_RATE_WINDOW_START};
use forager_domain::config::RateLimitConfig;

pub struct RateLimiter {
    store: Arc<dyn SettingsStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SettingsStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Whether another task may be processed in the current window.
    ///
    /// A fresh or elapsed window resets the counter first, then always
    /// admits. Inside a window the counter admits while below the limit,
    /// incrementing when `increment` is set; at the limit it returns false
    /// without touching state. Pass `increment = false` for pure
    /// availability checks (e.g. before opening a connection).
    pub fn should_continue(&self, increment: bool) -> bool {
        let now = Utc::now().timestamp_millis();
        let (window_start, count) = self.read_state();
        let window_ms = (self.config.window_secs as i64).saturating_mul(1000);

        if window_start == 0 || now - window_start >= window_ms {
            self.write_state(now, u32::from(increment));
            return true;
        }

        if count < self.config.max_per_window {
            if increment {
                self.write_state(window_start, count + 1);
            }
            return true;
        }

        tracing::warn!(
            count,
            limit = self.config.max_per_window,
            "rate limit reached for this window"
        );
        false
    }

    /// Quota still available in the current window (for diagnostics).
    pub fn remaining(&self) -> u32 {
        let now = Utc::now().timestamp_millis();
        let (window_start, count) = self.read_state();
        let window_ms = (self.config.window_secs as i64).saturating_mul(1000);
        if window_start == 0 || now - window_start >= window_ms {
            return self.config.max_per_window;
        }
        self.config.max_per_window.saturating_sub(count)
    }

    fn read_state(&self) -> (i64, u32) {
        let window_start = self
            .store
            .get(KEY_RATE_WINDOW_START)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let count = self
            .store
            .get(KEY_RATE_COUNT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        (window_start, count)
    }

    // Persistence failures are logged, not propagated: losing one increment
    // is acceptable, refusing to work is not.
    fn write_state(&self, window_start: i64, count: u32) {
        if let Err(e) = self
            .store
            .set(KEY_RATE_WINDOW_START, &window_start.to_string())
            .and_then(|_| self.store.set(KEY_RATE_COUNT, &count.to_string()))
        {
            tracing::warn!(error = %e, "failed to persist rate-limit state");
        }
    }
}
