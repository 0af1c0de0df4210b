// =============================================================================
// CircuitBreaker — closed/open/halfOpen with consecutive-failure backoff
// =============================================================================
//
// One instance guards one pair's order-placement path. Ported from
// `api_retry_manager.py`'s `CircuitBreaker` class, elaborated with the
// secondary consecutive-failure backoff described in SPEC_FULL.md §4.6: even
// while `closed` and below the trip threshold, repeated failures make
// `can_proceed` return false for a growing cooldown, so a flaky pair backs off
// gradually instead of hammering the exchange right up to the moment it trips.
// =============================================================================

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Network,
    ApiLimit,
    InsufficientBalance,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub cooldown: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: Duration::from_secs(60),
            backoff_multiplier: 1.5,
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl CircuitBreakerConfig {
    /// Production preset: same threshold/backoff, 300s base cooldown instead
    /// of 60s (SPEC_FULL.md §4.6, "raised to 300s in production preset").
    pub fn production() -> Self {
        Self {
            cooldown: Duration::from_secs(300),
            ..Self::default()
        }
    }
}

struct Inner {
    state: BreakerState,
    total_failures: u32,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<Instant>,
    failure_tally: [u32; 5],
}

impl Inner {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            total_failures: 0,
            consecutive_failures: 0,
            opened_at: None,
            last_failure_at: None,
            failure_tally: [0; 5],
        }
    }

    fn kind_index(kind: FailureKind) -> usize {
        match kind {
            FailureKind::Network => 0,
            FailureKind::ApiLimit => 1,
            FailureKind::InsufficientBalance => 2,
            FailureKind::Validation => 3,
            FailureKind::Unknown => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: BreakerState,
    pub total_failures: u32,
    pub consecutive_failures: u32,
    pub failure_tally: [u32; 5],
}

/// Per-pair breaker. All mutable state sits behind one lock, released before
/// any caller sleeps (SPEC_FULL.md §5 "Shared mutability").
pub struct CircuitBreaker {
    pair: String,
    config: CircuitBreakerConfig,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(pair: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            pair: pair.into(),
            config,
            inner: RwLock::new(Inner::new()),
        }
    }

    /// Advances `open -> halfOpen` if the cooldown has elapsed, then reports
    /// whether an order may be attempted right now.
    pub fn can_proceed(&self) -> bool {
        let mut inner = self.inner.write();
        self.maybe_transition_to_half_open(&mut inner);

        match inner.state {
            BreakerState::Open => false,
            BreakerState::HalfOpen => true,
            BreakerState::Closed => match inner.last_failure_at {
                None => true,
                Some(last) => {
                    let backoff = self.consecutive_backoff(inner.consecutive_failures);
                    last.elapsed() >= backoff
                }
            },
        }
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    info!(pair = %self.pair, "circuit breaker half-open: cooldown elapsed, probing");
                }
            }
        }
    }

    /// `min(cooldown * backoff_multiplier ^ (consecutive - 1), max_backoff)`.
    fn consecutive_backoff(&self, consecutive: u32) -> Duration {
        if consecutive == 0 {
            return Duration::ZERO;
        }
        let secs = self.config.cooldown.as_secs_f64()
            * self.config.backoff_multiplier.powi(consecutive as i32 - 1);
        Duration::from_secs_f64(secs).min(self.config.max_backoff)
    }

    pub fn record_failure(&self, kind: FailureKind) {
        let mut inner = self.inner.write();
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Instant::now());
        inner.failure_tally[Inner::kind_index(kind)] += 1;

        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(pair = %self.pair, ?kind, "probe failed in half-open, reopening breaker");
            }
            // §4.6/§8 scenario 5: "five *consecutive* order placements ...
            // breaker transitions closed -> open" — trip on the consecutive
            // run, not the lifetime total (a pair that fails once a day for
            // a week, succeeding hundreds of times in between, must not trip).
            BreakerState::Closed if inner.consecutive_failures >= self.config.threshold => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(
                    pair = %self.pair,
                    ?kind,
                    consecutive_failures = inner.consecutive_failures,
                    threshold = self.config.threshold,
                    "circuit breaker tripped: closed -> open"
                );
            }
            BreakerState::Closed => {
                warn!(
                    pair = %self.pair,
                    ?kind,
                    consecutive = inner.consecutive_failures,
                    "circuit breaker failure recorded, still closed"
                );
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.consecutive_failures = 0;

        if inner.state == BreakerState::HalfOpen {
            info!(pair = %self.pair, "circuit breaker recovered: half-open -> closed");
            inner.state = BreakerState::Closed;
            inner.total_failures = 0;
            inner.opened_at = None;
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.read().state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.read();
        CircuitBreakerSnapshot {
            state: inner.state,
            total_failures: inner.total_failures,
            consecutive_failures: inner.consecutive_failures,
            failure_tally: inner.failure_tally,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            threshold: 5,
            cooldown: Duration::from_millis(20),
            backoff_multiplier: 1.5,
            max_backoff: Duration::from_millis(100),
        }
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let cb = CircuitBreaker::new("BTC_USDT", test_config());
        for _ in 0..5 {
            cb.record_failure(FailureKind::ApiLimit);
        }
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_proceed());
    }

    #[test]
    fn intermittent_failures_below_threshold_never_trip_on_lifetime_total() {
        // A pair that fails once a day for a week, succeeding in between,
        // must stay closed: total_failures crosses the threshold but
        // consecutive_failures never does.
        let cb = CircuitBreaker::new("BTC_USDT", test_config());
        for _ in 0..8 {
            cb.record_failure(FailureKind::Network);
            cb.record_success();
        }
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.snapshot().total_failures, 8);
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn half_opens_after_cooldown_then_closes_on_success() {
        let cb = CircuitBreaker::new("ETH_USDT", test_config());
        for _ in 0..5 {
            cb.record_failure(FailureKind::Network);
        }
        assert!(!cb.can_proceed());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.can_proceed());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_and_resets_cooldown_clock() {
        let cb = CircuitBreaker::new("ETH_USDT", test_config());
        for _ in 0..5 {
            cb.record_failure(FailureKind::Network);
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.can_proceed());
        cb.record_failure(FailureKind::Network);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_proceed());
    }

    #[test]
    fn closed_state_backs_off_after_each_failure_below_threshold() {
        let cb = CircuitBreaker::new("SOL_USDT", test_config());
        cb.record_failure(FailureKind::Unknown);
        assert_eq!(cb.state(), BreakerState::Closed);
        // Immediately after a failure the consecutive-failure backoff should
        // block a retry even though total_failures is below threshold.
        assert!(!cb.can_proceed());
        std::thread::sleep(Duration::from_millis(25));
        assert!(cb.can_proceed());
    }

    #[test]
    fn success_clears_consecutive_backoff() {
        let cb = CircuitBreaker::new("SOL_USDT", test_config());
        cb.record_failure(FailureKind::Unknown);
        cb.record_success();
        assert!(cb.can_proceed());
    }

    #[test]
    fn failure_tally_counts_per_kind() {
        let cb = CircuitBreaker::new("BTC_USDT", test_config());
        cb.record_failure(FailureKind::Network);
        cb.record_failure(FailureKind::Network);
        cb.record_failure(FailureKind::Validation);
        let snap = cb.snapshot();
        assert_eq!(snap.failure_tally[Inner::kind_index(FailureKind::Network)], 2);
        assert_eq!(snap.failure_tally[Inner::kind_index(FailureKind::Validation)], 1);
    }
}
