// =============================================================================
// Sliding-window rate limiter
// =============================================================================

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::RateLimitStrategy;

pub struct SlidingWindowLimiter {
    window: Duration,
    safe_max: u32,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, safe_max: u32) -> Self {
        Self {
            window,
            safe_max,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>) {
        let cutoff = Instant::now() - self.window;
        while let Some(front) = timestamps.front() {
            if *front < cutoff {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn can_make_request(&self) -> bool {
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps);
        (timestamps.len() as u32) < self.safe_max
    }

    pub fn record_request(&self) {
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps);
        timestamps.push_back(Instant::now());
    }

    /// Seconds until the oldest kept timestamp falls out of the window, or 0
    /// if the limiter isn't currently saturated.
    pub fn time_until_next_request(&self) -> f64 {
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps);
        if (timestamps.len() as u32) < self.safe_max {
            return 0.0;
        }
        match timestamps.front() {
            Some(oldest) => {
                let release = *oldest + self.window;
                release.saturating_duration_since(Instant::now()).as_secs_f64()
            }
            None => 0.0,
        }
    }

    pub fn in_flight(&self) -> u32 {
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps);
        timestamps.len() as u32
    }
}

impl RateLimitStrategy for SlidingWindowLimiter {
    fn can_make_request(&self) -> bool {
        SlidingWindowLimiter::can_make_request(self)
    }

    fn record_request(&self) {
        SlidingWindowLimiter::record_request(self)
    }

    fn time_until_next_request(&self) -> f64 {
        SlidingWindowLimiter::time_until_next_request(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_safe_max_then_blocks() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(1), 3);
        for _ in 0..3 {
            assert!(limiter.can_make_request());
            limiter.record_request();
        }
        assert!(!limiter.can_make_request());
    }

    #[test]
    fn time_until_next_request_is_zero_when_unsaturated() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(1), 3);
        assert_eq!(limiter.time_until_next_request(), 0.0);
    }

    #[test]
    fn time_until_next_request_positive_when_saturated() {
        let limiter = SlidingWindowLimiter::new(Duration::from_millis(200), 1);
        limiter.record_request();
        assert!(limiter.time_until_next_request() > 0.0);
    }
}
