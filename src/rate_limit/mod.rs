// =============================================================================
// RateLimitEnforcer — per-category sliding-window / token-bucket limiter
// =============================================================================
//
// The VIP-0 quotas below are the reference values from Gate.io's published
// rate limits, matching `rate_limit_manager.py`'s `RateLimitRegistry.VIP_0_LIMITS`
// and this crate's SPEC_FULL.md §4.3 table exactly.
// =============================================================================

pub mod classifier;
pub mod sliding_window;
pub mod token_bucket;

use std::collections::HashMap;
use std::time::Duration;

pub use classifier::EndpointClassifier;
use sliding_window::SlidingWindowLimiter;
use token_bucket::TokenBucketLimiter;

/// Shared shape both limiter implementations satisfy (SPEC_FULL.md §4.3:
/// "canMakeRequest / recordRequest / timeUntilNextRequest", selectable per
/// category). `RateLimitEnforcer` stores one boxed strategy per category
/// rather than hardcoding `SlidingWindowLimiter` everywhere.
pub trait RateLimitStrategy: Send + Sync {
    fn can_make_request(&self) -> bool;
    fn record_request(&self);
    fn time_until_next_request(&self) -> f64;
}

/// Which concrete limiter backs a category. Order-mutating categories (place/
/// cancel/withdraw) keep the exact sliding-window accounting so a burst can
/// never exceed `safe_max` within the window; the higher-volume read/"other"
/// categories use the token bucket's smoother, self-pacing refill instead.
fn strategy_for(category: RateLimitCategory) -> RateLimitStrategyKind {
    use RateLimitCategory::*;
    match category {
        SpotOrderPlace | SpotOrderCancel | WalletWithdraw | FuturesOrder | FuturesCancel => {
            RateLimitStrategyKind::SlidingWindow
        }
        Public | SpotOther | WalletTransfer | WalletOther | FuturesOther => RateLimitStrategyKind::TokenBucket,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateLimitStrategyKind {
    SlidingWindow,
    TokenBucket,
}

fn build_limiter(category: RateLimitCategory) -> Box<dyn RateLimitStrategy> {
    let cfg = RateLimitConfig::vip0(category);
    match strategy_for(category) {
        RateLimitStrategyKind::SlidingWindow => {
            Box::new(SlidingWindowLimiter::new(cfg.window, cfg.safe_max()))
        }
        RateLimitStrategyKind::TokenBucket => {
            Box::new(TokenBucketLimiter::new(cfg.safe_max(), cfg.window.as_secs_f64()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitCategory {
    Public,
    SpotOrderPlace,
    SpotOrderCancel,
    SpotOther,
    WalletTransfer,
    WalletWithdraw,
    WalletOther,
    FuturesOrder,
    FuturesCancel,
    FuturesOther,
}

impl RateLimitCategory {
    pub const ALL: [RateLimitCategory; 10] = [
        Self::Public,
        Self::SpotOrderPlace,
        Self::SpotOrderCancel,
        Self::SpotOther,
        Self::WalletTransfer,
        Self::WalletWithdraw,
        Self::WalletOther,
        Self::FuturesOrder,
        Self::FuturesCancel,
        Self::FuturesOther,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::SpotOrderPlace => "spot-order-place",
            Self::SpotOrderCancel => "spot-order-cancel",
            Self::SpotOther => "spot-other",
            Self::WalletTransfer => "wallet-transfer",
            Self::WalletWithdraw => "wallet-withdraw",
            Self::WalletOther => "wallet-other",
            Self::FuturesOrder => "futures-order",
            Self::FuturesCancel => "futures-cancel",
            Self::FuturesOther => "futures-other",
        }
    }
}

/// `(max_requests, window, burst_allowance)` — `safe_max = floor(max * burst)`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub burst_allowance: f64,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
            burst_allowance: 0.8,
        }
    }

    pub fn safe_max(&self) -> u32 {
        (((self.max_requests as f64) * self.burst_allowance) as u32).max(1)
    }

    /// The VIP-0 quota table (SPEC_FULL.md §4.3).
    pub fn vip0(category: RateLimitCategory) -> Self {
        use RateLimitCategory::*;
        match category {
            Public => Self::new(200, 10),
            SpotOrderPlace => Self::new(10, 1),
            SpotOrderCancel => Self::new(200, 1),
            SpotOther => Self::new(200, 10),
            WalletTransfer => Self::new(80, 10),
            WalletWithdraw => Self::new(1, 3),
            WalletOther => Self::new(200, 10),
            FuturesOrder => Self::new(100, 1),
            FuturesCancel => Self::new(200, 1),
            FuturesOther => Self::new(200, 10),
        }
    }
}

/// Facade over one rate-limit strategy per category. Thread-safe; no lock is
/// held across an `.await` point by any caller of this type.
pub struct RateLimitEnforcer {
    limiters: HashMap<RateLimitCategory, Box<dyn RateLimitStrategy>>,
    classifier: EndpointClassifier,
}

impl Default for RateLimitEnforcer {
    fn default() -> Self {
        let limiters = RateLimitCategory::ALL
            .into_iter()
            .map(|cat| (cat, build_limiter(cat)))
            .collect();
        Self {
            limiters,
            classifier: EndpointClassifier::new(),
        }
    }
}

impl RateLimitEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, path: &str, method: &str) -> RateLimitCategory {
        self.classifier.classify(path, method)
    }

    pub fn can_make_request(&self, category: RateLimitCategory) -> bool {
        self.limiters
            .get(&category)
            .map(|l| l.can_make_request())
            .unwrap_or(true)
    }

    pub fn record_request(&self, category: RateLimitCategory) {
        if let Some(l) = self.limiters.get(&category) {
            l.record_request();
        }
    }

    pub fn time_until_next_request(&self, category: RateLimitCategory) -> f64 {
        self.limiters
            .get(&category)
            .map(|l| l.time_until_next_request())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vip0_safe_max_matches_burst_allowance() {
        let cfg = RateLimitConfig::vip0(RateLimitCategory::SpotOrderPlace);
        assert_eq!(cfg.max_requests, 10);
        assert_eq!(cfg.window, Duration::from_secs(1));
        assert_eq!(cfg.safe_max(), 8); // floor(10 * 0.8)
    }

    #[test]
    fn rate_limiter_bound_holds_per_category() {
        // Over any window, recorded requests via the limiter never exceed safe_max.
        let enforcer = RateLimitEnforcer::new();
        let cat = RateLimitCategory::SpotOrderPlace;
        let safe_max = RateLimitConfig::vip0(cat).safe_max();
        let mut admitted = 0;
        for _ in 0..40 {
            if enforcer.can_make_request(cat) {
                enforcer.record_request(cat);
                admitted += 1;
            }
        }
        assert_eq!(admitted, safe_max);
    }

    #[test]
    fn order_mutation_categories_use_sliding_window_others_use_token_bucket() {
        use RateLimitCategory::*;
        for cat in [SpotOrderPlace, SpotOrderCancel, WalletWithdraw, FuturesOrder, FuturesCancel] {
            assert_eq!(strategy_for(cat), RateLimitStrategyKind::SlidingWindow);
        }
        for cat in [Public, SpotOther, WalletTransfer, WalletOther, FuturesOther] {
            assert_eq!(strategy_for(cat), RateLimitStrategyKind::TokenBucket);
        }
    }

    #[test]
    fn categories_are_independent() {
        let enforcer = RateLimitEnforcer::new();
        for _ in 0..RateLimitConfig::vip0(RateLimitCategory::WalletWithdraw).safe_max() {
            enforcer.record_request(RateLimitCategory::WalletWithdraw);
        }
        assert!(!enforcer.can_make_request(RateLimitCategory::WalletWithdraw));
        assert!(enforcer.can_make_request(RateLimitCategory::Public));
    }
}
