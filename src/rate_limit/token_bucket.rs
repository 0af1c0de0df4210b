// =============================================================================
// Token-bucket rate limiter — alternate strategy behind the same shape
// =============================================================================

use std::time::Instant;

use parking_lot::Mutex;

use super::RateLimitStrategy;

struct State {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucketLimiter {
    capacity: f64,
    refill_rate: f64, // tokens per second
    state: Mutex<State>,
}

impl TokenBucketLimiter {
    pub fn new(safe_max: u32, window_secs: f64) -> Self {
        let capacity = safe_max as f64;
        Self {
            capacity,
            refill_rate: capacity / window_secs,
            state: Mutex::new(State {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut State) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = Instant::now();
    }

    pub fn can_make_request(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens >= 1.0
    }

    pub fn record_request(&self) {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens = (state.tokens - 1.0).max(0.0);
    }

    pub fn time_until_next_request(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            0.0
        } else {
            (1.0 - state.tokens) / self.refill_rate
        }
    }
}

impl RateLimitStrategy for TokenBucketLimiter {
    fn can_make_request(&self) -> bool {
        TokenBucketLimiter::can_make_request(self)
    }

    fn record_request(&self) {
        TokenBucketLimiter::record_request(self)
    }

    fn time_until_next_request(&self) -> f64 {
        TokenBucketLimiter::time_until_next_request(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_capacity_then_blocks() {
        let bucket = TokenBucketLimiter::new(2, 10.0);
        assert!(bucket.can_make_request());
        bucket.record_request();
        assert!(bucket.can_make_request());
        bucket.record_request();
        assert!(!bucket.can_make_request());
    }

    #[test]
    fn time_until_next_request_is_positive_when_empty() {
        let bucket = TokenBucketLimiter::new(1, 10.0);
        bucket.record_request();
        assert!(bucket.time_until_next_request() > 0.0);
    }
}
