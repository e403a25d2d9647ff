//! Continuous token bucket admission gate.

use std::sync::Mutex;
use std::time::Instant;

use super::lock;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket refilled continuously at `refill_rate` tokens per second
/// and capped at `capacity` tokens.
///
/// The bucket starts full. With the default capacity of 1 the gate admits at
/// most one request per `1 / refill_rate` seconds and tolerates no burst.
///
/// # Invariant
///
/// `0 <= tokens <= capacity` after every operation.
#[derive(Debug)]
pub struct TokenBucket {
    refill_rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// # Parameters
    /// - `refill_rate`: tokens added per second (the configured requests per second)
    /// - `capacity`: maximum number of stored tokens (burst size)
    pub fn new(refill_rate: f64, capacity: u32) -> Self {
        Self::full_at(refill_rate, capacity, Instant::now())
    }

    pub fn full_at(refill_rate: f64, capacity: u32, now: Instant) -> Self {
        let capacity = f64::from(capacity);
        Self {
            refill_rate: refill_rate.max(0.0),
            capacity,
            state: Mutex::new(BucketState { tokens: capacity, last_refill: now }),
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = lock(&self.state);
        self.refill(&mut state, now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens that would be available at `now`, without consuming any.
    pub fn available_at(&self, now: Instant) -> f64 {
        let state = lock(&self.state);
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // An instant older than the last refill adds nothing and must not
        // rewind `last_refill`.
        if now <= state.last_refill {
            return;
        }
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}
