//! Token-bucket admission control.
//!
//! The bucket starts full and refills continuously at `fill_rate` tokens per
//! second, clamped at `capacity`. [`TokenBucket::try_acquire`] refills from
//! the elapsed wall clock and consumes in one critical section; it never
//! waits, so the dispatch path stays non-blocking and a denied request is
//! answered immediately with a rate-limit envelope.

use std::time::Instant;

use parking_lot::Mutex;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with continuous refill.
pub struct TokenBucket {
    capacity: f64,
    fill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket holding `capacity` tokens that refills at
    /// `fill_rate` tokens per second.
    pub fn new(capacity: u32, fill_rate: f64) -> Self {
        Self {
            capacity: capacity as f64,
            fill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Convenience constructor matching the limiter configuration surface:
    /// burst capacity and sustained rate are both `requests_per_second`.
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(requests_per_second, requests_per_second as f64)
    }

    /// Attempts to take one token.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_n(1)
    }

    /// Attempts to take `n` tokens atomically.
    ///
    /// Tokens accrued since the last call are credited first, clamped at
    /// capacity. Returns `false` without waiting when the bucket holds fewer
    /// than `n` tokens.
    pub fn try_acquire_n(&self, n: u32) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();

        state.tokens = (state.tokens + elapsed * self.fill_rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= n as f64 {
            state.tokens -= n as f64;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, after crediting the elapsed time.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.fill_rate).min(self.capacity);
        state.last_refill = now;
        state.tokens
    }
}
