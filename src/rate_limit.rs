//! Global fixed-window limiter guarding calls to the LLM backend.
//!
//! One counter for the whole process: at most `max_requests` generation
//! calls per `window`. The window restarts lazily on the first call after it
//! has elapsed, so a burst of `max_requests` is admitted right after every
//! boundary even if the previous window was saturated at its very end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::Clock;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 2;

/// Window state: when the current window opened and how many requests it has
/// admitted so far.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    start: DateTime<Utc>,
    count: u32,
}

/// Fixed-window request counter.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    window: TimeDelta,
    max_requests: u32,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    /// Create a limiter whose first window opens now.
    pub fn new(clock: Arc<dyn Clock>, window: Duration, max_requests: u32) -> Self {
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        let start = clock.now();
        Self {
            clock,
            window,
            max_requests,
            state: Mutex::new(RateWindow { start, count: 0 }),
        }
    }

    /// Try to take a slot in the current window.
    ///
    /// Returns `false` without touching the counter when the window is full.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if now - state.start >= self.window {
            state.count = 0;
            state.start = now;
        }

        if state.count >= self.max_requests {
            tracing::debug!(
                count = state.count,
                max = self.max_requests,
                "Rate window full, denying request"
            );
            return false;
        }

        state.count += 1;
        true
    }

    /// How many requests the window would still admit right now.
    pub fn remaining(&self) -> u32 {
        let now = self.clock.now();
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if now - state.start >= self.window {
            self.max_requests
        } else {
            self.max_requests.saturating_sub(state.count)
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn limiter(max: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        ));
        let limiter = RateLimiter::new(clock.clone(), DEFAULT_WINDOW, max);
        (limiter, clock)
    }

    #[test]
    fn third_request_in_window_is_denied() {
        let (limiter, _clock) = limiter(2);
        let results: Vec<bool> = (0..3).map(|_| limiter.try_acquire()).collect();
        assert_eq!(results, vec![true, true, false]);
    }

    #[test]
    fn window_reopens_after_duration() {
        let (limiter, clock) = limiter(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        clock.advance(TimeDelta::seconds(61));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn reset_happens_exactly_at_window_boundary() {
        let (limiter, clock) = limiter(1);
        assert!(limiter.try_acquire());

        clock.advance(TimeDelta::seconds(59));
        assert!(!limiter.try_acquire());

        clock.advance(TimeDelta::seconds(1));
        assert!(limiter.try_acquire(), "elapsed == window must reset");
    }

    #[test]
    fn denial_does_not_consume_or_extend_window() {
        let (limiter, clock) = limiter(1);
        assert!(limiter.try_acquire());
        clock.advance(TimeDelta::seconds(30));
        assert!(!limiter.try_acquire());
        clock.advance(TimeDelta::seconds(30));
        // Window started at t=0, so t=60 reopens it despite the denial at t=30.
        assert!(limiter.try_acquire());
    }

    #[test]
    fn burst_allowed_across_boundary() {
        let (limiter, clock) = limiter(2);
        assert!(limiter.try_acquire());
        clock.advance(TimeDelta::seconds(59));
        assert!(limiter.try_acquire());
        clock.advance(TimeDelta::seconds(1));
        // Fresh window immediately after a saturated one.
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn zero_max_always_denies() {
        let (limiter, clock) = limiter(0);
        assert!(!limiter.try_acquire());
        clock.advance(TimeDelta::minutes(5));
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn remaining_tracks_window() {
        let (limiter, clock) = limiter(2);
        assert_eq!(limiter.remaining(), 2);
        limiter.try_acquire();
        assert_eq!(limiter.remaining(), 1);
        limiter.try_acquire();
        assert_eq!(limiter.remaining(), 0);
        clock.advance(TimeDelta::seconds(60));
        assert_eq!(limiter.remaining(), 2);
    }
}
