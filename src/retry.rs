// =============================================================================
// RetryManager — bounded retry loop with typed classification and backoff
// =============================================================================
//
// Ported from `api_retry_manager.py`'s `ApiRetryManager` / `ExponentialBackoffCalculator`
// / `GateIORateLimitHandler`. The delay formula, rate-limit floor, and jitter
// range match that source exactly.
// =============================================================================

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::ErrorCategory;
use crate::safe_sleep::{SafeSleepManager, SleepContext};

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: f64,
    pub max_delay: f64,
    pub exponential_base: f64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl RetryConfig {
    /// `create_gate_io_retry_manager()` preset.
    pub fn gate_io() -> Self {
        Self {
            max_attempts: 5,
            base_delay: 1.0,
            max_delay: 300.0,
            exponential_base: 2.0,
            backoff_multiplier: 1.5,
            jitter: true,
        }
    }

    /// `create_aggressive_retry_manager()` preset, for fast local iteration.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 10,
            base_delay: 0.5,
            max_delay: 60.0,
            exponential_base: 1.5,
            backoff_multiplier: 1.2,
            jitter: true,
        }
    }

    /// Delay policy: `base * exponentialBase^(attempt-1) * backoffMultiplier`,
    /// floored at 60s for rate limits, capped at `maxDelay`, +-20% jitter,
    /// minimum final delay 100ms.
    fn calculate_delay(&self, attempt: u32, error: ErrorCategory) -> f64 {
        let mut delay = self.base_delay * self.exponential_base.powi(attempt as i32 - 1);

        if error == ErrorCategory::RateLimit {
            delay = delay.max(60.0);
        }

        delay *= self.backoff_multiplier;
        delay = delay.min(self.max_delay);

        if self.jitter {
            let spread = delay * 0.2;
            let noise = crate::safe_sleep::jitter_unit() * 2.0 - 1.0;
            delay += noise * spread;
        }

        delay.max(0.1)
    }
}

#[derive(Debug, Clone)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub error_type: ErrorCategory,
    pub delay_seconds: f64,
    pub error_message: String,
}

/// Rate-limit cooldown tracked independently of the per-category
/// RateLimitEnforcer — this is the *local* "don't even try yet" gate
/// consulted before sleeping, matching `GateIORateLimitHandler`.
struct RateLimitGate {
    rate_limited_until: Option<Instant>,
}

pub struct RetryManager {
    config: RetryConfig,
    sleeper: std::sync::Arc<SafeSleepManager>,
    gate: Mutex<RateLimitGate>,
}

pub enum RetryOutcome<T> {
    Success(T),
    /// All attempts exhausted; carries the classified error of the final try.
    Exhausted(ErrorCategory, String),
    /// The local rate-limit gate was in cooldown and the call was never made.
    SkippedRateLimited,
}

impl RetryManager {
    pub fn new(config: RetryConfig, sleeper: std::sync::Arc<SafeSleepManager>) -> Self {
        Self {
            config,
            sleeper,
            gate: Mutex::new(RateLimitGate {
                rate_limited_until: None,
            }),
        }
    }

    fn can_make_request(&self) -> bool {
        match self.gate.lock().rate_limited_until {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    fn note_rate_limited(&self, retry_after: Option<f64>) {
        let delay = retry_after.map(|s| s * 1.2).unwrap_or(60.0 + crate::safe_sleep::jitter_unit() * 30.0);
        self.gate.lock().rate_limited_until = Some(Instant::now() + Duration::from_secs_f64(delay));
    }

    /// Runs `operation` up to `max_attempts` times. `classify` maps the
    /// operation's error into a category (rule 1, the caller-supplied
    /// classifier, per SPEC_FULL.md §4.5); `retry_after` extracts a
    /// `Retry-After` hint from the failure, if any.
    pub async fn execute_with_retry<T, E, Fut, Op, Classify, RetryAfter>(
        &self,
        operation_name: &str,
        mut operation: Op,
        classify: Classify,
        retry_after: RetryAfter,
    ) -> RetryOutcome<T>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classify: Fn(&E) -> ErrorCategory,
        RetryAfter: Fn(&E) -> Option<f64>,
        E: std::fmt::Display,
    {
        let mut last_error = (ErrorCategory::Unknown, String::new());
        // SPEC_FULL.md §4.5 error-classification rules: `unknown` gets its own
        // one-retry cap independent of `max_attempts` ("retried once then
        // surfaced"), unlike network/server/timeout/rateLimit which retry up
        // to the full attempt budget.
        let mut unknown_failures: u32 = 0;

        for attempt in 1..=self.config.max_attempts {
            if !self.can_make_request() {
                warn!(operation_name, "skipping attempt: local rate-limit gate in cooldown");
                return RetryOutcome::SkippedRateLimited;
            }

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation_name, attempt, "operation succeeded after retry");
                    }
                    return RetryOutcome::Success(value);
                }
                Err(err) => {
                    let category = classify(&err);
                    let message = err.to_string();
                    last_error = (category, message.clone());

                    if category == ErrorCategory::RateLimit {
                        self.note_rate_limited(retry_after(&err));
                    }

                    if category == ErrorCategory::Unknown {
                        unknown_failures += 1;
                    }
                    let unknown_cap_exceeded = category == ErrorCategory::Unknown && unknown_failures > 1;

                    if !category.is_retryable() || attempt >= self.config.max_attempts || unknown_cap_exceeded {
                        warn!(
                            operation_name,
                            attempt,
                            error_type = %category,
                            "retry exhausted or non-retryable error"
                        );
                        break;
                    }

                    let delay = self.config.calculate_delay(attempt, category);
                    let record = RetryAttempt {
                        attempt_number: attempt,
                        error_type: category,
                        delay_seconds: delay,
                        error_message: message,
                    };
                    info!(
                        operation_name,
                        attempt = record.attempt_number,
                        error_type = %record.error_type,
                        delay = record.delay_seconds,
                        "retrying after backoff"
                    );

                    if category == ErrorCategory::RateLimit {
                        self.sleeper.rate_limit_sleep(retry_after(&err)).await;
                    } else {
                        self.sleeper
                            .safe_sleep(delay, SleepContext::ApiRetry, self.config.jitter)
                            .await;
                    }
                }
            }
        }

        RetryOutcome::Exhausted(last_error.0, last_error.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn manager(config: RetryConfig) -> RetryManager {
        RetryManager::new(
            config,
            Arc::new(SafeSleepManager::new(crate::safe_sleep::SleepLimits {
                min_sleep: 0.001,
                max_sleep: 1.0,
                default_sleep: 0.01,
                max_total_wait: 1000.0,
            })),
        )
    }

    #[test]
    fn delay_formula_matches_spec() {
        let cfg = RetryConfig {
            jitter: false,
            ..RetryConfig::gate_io()
        };
        // attempt 1: 1.0 * 2^0 * 1.5 = 1.5
        assert!((cfg.calculate_delay(1, ErrorCategory::Network) - 1.5).abs() < 1e-9);
        // attempt 3: 1.0 * 2^2 * 1.5 = 6.0
        assert!((cfg.calculate_delay(3, ErrorCategory::Network) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn rate_limit_delay_is_floored_at_sixty() {
        let cfg = RetryConfig {
            jitter: false,
            ..RetryConfig::gate_io()
        };
        let delay = cfg.calculate_delay(1, ErrorCategory::RateLimit);
        assert!(delay >= 60.0 * cfg.backoff_multiplier - 1e-9);
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let cfg = RetryConfig {
            jitter: false,
            max_delay: 10.0,
            ..RetryConfig::gate_io()
        };
        assert_eq!(cfg.calculate_delay(20, ErrorCategory::Server), 10.0);
    }

    #[tokio::test]
    async fn retries_up_to_max_attempts_then_exhausts() {
        let mgr = manager(RetryConfig {
            max_attempts: 3,
            base_delay: 0.001,
            max_delay: 0.01,
            exponential_base: 1.0,
            backoff_multiplier: 1.0,
            jitter: false,
        });
        let calls = AtomicU32::new(0);
        let outcome = mgr
            .execute_with_retry(
                "test-op",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), &str>("network timeout") }
                },
                |_| ErrorCategory::Network,
                |_| None,
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(outcome, RetryOutcome::Exhausted(ErrorCategory::Network, _)));
    }

    #[tokio::test]
    async fn unknown_errors_retry_once_then_surface_regardless_of_max_attempts() {
        let mgr = manager(RetryConfig {
            max_attempts: 5,
            base_delay: 0.001,
            max_delay: 0.01,
            exponential_base: 1.0,
            backoff_multiplier: 1.0,
            jitter: false,
        });
        let calls = AtomicU32::new(0);
        let outcome = mgr
            .execute_with_retry(
                "unknown-op",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), &str>("something odd") }
                },
                |_| ErrorCategory::Unknown,
                |_| None,
            )
            .await;
        // one initial attempt + exactly one retry, not all 5 max_attempts.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(outcome, RetryOutcome::Exhausted(ErrorCategory::Unknown, _)));
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let mgr = manager(RetryConfig::gate_io());
        let calls = AtomicU32::new(0);
        let outcome = mgr
            .execute_with_retry(
                "validate",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), &str>("bad argument") }
                },
                |_| ErrorCategory::Validation,
                |_| None,
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(outcome, RetryOutcome::Exhausted(ErrorCategory::Validation, _)));
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let mgr = manager(RetryConfig::gate_io());
        let outcome = mgr
            .execute_with_retry("ok-op", || async { Ok::<_, &str>(42) }, |_| ErrorCategory::Unknown, |_| None)
            .await;
        assert!(matches!(outcome, RetryOutcome::Success(42)));
    }
}
