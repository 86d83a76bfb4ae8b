//! Rate limiting for render-thread diagnostics
//!
//! A render-thread failure (pool exhaustion, capacity overrun) recurs every
//! cycle until the control thread reacts - hundreds of times per second.
//! Reporting paths hold a [`RateLimiter`] and ask it before logging so the
//! first occurrences are visible and the rest are counted silently.
//!
//! `allow()` is lock-free and allocation-free; it is safe to call from the
//! render thread.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::time::{self, HostTicks};

/// Default report budget: 10 events per second
pub const DEFAULT_MAX_EVENTS: u32 = 10;

/// Fixed-window rate limiter backed by atomics
#[derive(Debug)]
pub struct RateLimiter {
    max_events: u32,
    interval_ticks: HostTicks,
    window_start: AtomicU64,
    count: AtomicU32,
}

impl RateLimiter {
    /// Create a limiter allowing `max_events` per `interval`
    pub fn new(max_events: u32, interval: Duration) -> Self {
        Self {
            max_events,
            interval_ticks: interval.as_nanos() as HostTicks,
            window_start: AtomicU64::new(0),
            count: AtomicU32::new(0),
        }
    }

    /// Whether one more event fits in the current window
    ///
    /// Returns `true` while the window has budget left. Concurrent callers
    /// may very occasionally land an extra event across a window boundary;
    /// the bound is approximate, which is fine for throttling diagnostics.
    pub fn allow(&self) -> bool {
        let now = time::current_host_ticks();
        let start = self.window_start.load(Ordering::Acquire);
        if now.saturating_sub(start) >= self.interval_ticks {
            // Window expired: whoever wins the race resets the counter
            if self
                .window_start
                .compare_exchange(start, now, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.count.store(0, Ordering::Release);
            }
        }
        self.count.fetch_add(1, Ordering::AcqRel) < self.max_events
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_budget() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.allow());
        assert!(!limiter.allow());
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.allow());
    }
}
