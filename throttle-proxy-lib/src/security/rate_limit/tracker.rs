//! Fixed one-second occupancy window for a single client.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::lock;

/// Length of the occupancy window.
pub const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    start: Instant,
    count: u32,
    last_seen: Instant,
}

/// Counts a client's requests in the current one-second window.
///
/// The window resets wholesale: once a full second has elapsed since
/// `start`, the next recorded request opens a new window at its own arrival
/// time and counts as 1. There is no continuous decay.
///
/// # Thread Safety
///
/// The read-check-reset-increment sequence runs under one mutex, so
/// concurrent requests from the same client each observe a distinct count.
/// The window start never moves backward, even when a caller passes an
/// instant taken before another caller's.
#[derive(Debug)]
pub struct RequestTracker {
    window: Mutex<Window>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a tracker whose first window opens at `now`.
    pub fn starting_at(now: Instant) -> Self {
        Self { window: Mutex::new(Window { start: now, count: 0, last_seen: now }) }
    }

    /// Record one request and return the number of requests in the current
    /// window, this one included.
    pub fn record(&self) -> u32 {
        self.record_at(Instant::now())
    }

    pub fn record_at(&self, now: Instant) -> u32 {
        let mut window = lock(&self.window);
        if now.saturating_duration_since(window.start) >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        window.count = window.count.saturating_add(1);
        window.last_seen = window.last_seen.max(now);
        window.count
    }

    /// Requests seen in the window that is still open, or 0 if it has
    /// expired. Does not modify the window.
    pub fn current_rate(&self) -> u32 {
        self.current_rate_at(Instant::now())
    }

    pub fn current_rate_at(&self, now: Instant) -> u32 {
        let window = lock(&self.window);
        if now.saturating_duration_since(window.start) < WINDOW {
            window.count
        } else {
            0
        }
    }

    /// Start of the current window.
    pub fn window_start(&self) -> Instant {
        lock(&self.window).start
    }

    /// Arrival time of the most recent request, or creation time if none.
    pub fn last_seen(&self) -> Instant {
        lock(&self.window).last_seen
    }

    /// Time since the tracker was last touched. The eviction sweep compares
    /// this against its staleness threshold.
    pub fn idle_for_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen())
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}
