// =============================================================================
// SafetySystem — daily P&L and win-rate gate wrapping the state machine
// =============================================================================
//
// Grounded on teacher's `risk.rs` `RwLock<Inner>` + UTC-day-rollover
// double-checked-locking pattern, narrowed to the two rules SPEC_FULL.md
// §4.11 actually specifies: a daily loss floor and a minimum win rate once
// enough trades have been observed. Thresholds are deliberately permissive
// (§9 open question: no streak-based unlock).
// =============================================================================

use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct SafetyConfig {
    pub max_daily_loss: Decimal,
    pub min_win_rate: f64,
    pub min_trades_for_win_rate_check: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: Decimal::new(20, 0),
            min_win_rate: 0.3,
            min_trades_for_win_rate_check: 5,
        }
    }
}

struct Inner {
    current_date: NaiveDate,
    daily_pnl: Decimal,
    trades: Vec<Decimal>,
    denied: bool,
    denial_reason: Option<String>,
}

pub struct SafetySystem {
    config: SafetyConfig,
    inner: RwLock<Inner>,
}

impl SafetySystem {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                current_date: Utc::now().date_naive(),
                daily_pnl: Decimal::ZERO,
                trades: Vec::new(),
                denied: false,
                denial_reason: None,
            }),
        }
    }

    /// On a new UTC day, reset counters; append `pnl`; re-evaluate denial.
    pub fn record_trade(&self, pnl: Decimal) {
        let mut inner = self.inner.write();
        self.roll_day_if_needed(&mut inner);

        inner.trades.push(pnl);
        inner.daily_pnl += pnl;
        self.evaluate(&mut inner);
    }

    /// Consulted before every loop iteration; a denial exits the loop.
    pub fn can_trade(&self) -> bool {
        let mut inner = self.inner.write();
        self.roll_day_if_needed(&mut inner);
        !inner.denied
    }

    pub fn denial_reason(&self) -> Option<String> {
        self.inner.read().denial_reason.clone()
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.inner.read().daily_pnl
    }

    /// Realized P&L for the current UTC day, oldest first, as `f64` — feeds
    /// `LogAnalyzer::analyze_recent`'s last-10-vs-prior-10 decline check
    /// (§4.7), which works in plain floats since it only compares averages.
    pub fn trade_pnls_f64(&self) -> Vec<f64> {
        self.inner
            .read()
            .trades
            .iter()
            .map(|d| d.to_string().parse::<f64>().unwrap_or(0.0))
            .collect()
    }

    fn roll_day_if_needed(&self, inner: &mut Inner) {
        let today = Utc::now().date_naive();
        if inner.current_date != today {
            inner.current_date = today;
            inner.daily_pnl = Decimal::ZERO;
            inner.trades.clear();
            inner.denied = false;
            inner.denial_reason = None;
        }
    }

    fn evaluate(&self, inner: &mut Inner) {
        if inner.daily_pnl < -self.config.max_daily_loss {
            inner.denied = true;
            inner.denial_reason = Some(format!(
                "daily loss {} exceeds max {}",
                inner.daily_pnl, self.config.max_daily_loss
            ));
            warn!(daily_pnl = %inner.daily_pnl, "safety system: daily loss limit tripped");
            return;
        }

        if inner.trades.len() >= self.config.min_trades_for_win_rate_check {
            let wins = inner.trades.iter().filter(|p| **p > Decimal::ZERO).count();
            let win_rate = wins as f64 / inner.trades.len() as f64;
            if win_rate < self.config.min_win_rate {
                inner.denied = true;
                inner.denial_reason = Some(format!(
                    "win rate {:.2} below minimum {:.2}",
                    win_rate, self.config.min_win_rate
                ));
                warn!(win_rate, "safety system: win rate floor tripped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SafetyConfig {
        SafetyConfig {
            max_daily_loss: Decimal::new(20, 0),
            min_win_rate: 0.3,
            min_trades_for_win_rate_check: 5,
        }
    }

    #[test]
    fn denies_after_exceeding_daily_loss() {
        let safety = SafetySystem::new(config());
        safety.record_trade(Decimal::new(-10, 0));
        assert!(safety.can_trade());
        safety.record_trade(Decimal::new(-15, 0));
        assert!(!safety.can_trade());
        assert!(safety.denial_reason().unwrap().contains("daily loss"));
    }

    #[test]
    fn denies_after_five_trades_below_min_win_rate() {
        let safety = SafetySystem::new(config());
        for pnl in [Decimal::new(1, 0), Decimal::new(-1, 0), Decimal::new(-1, 0), Decimal::new(-1, 0)] {
            safety.record_trade(pnl);
            assert!(safety.can_trade());
        }
        safety.record_trade(Decimal::new(-1, 0));
        assert!(!safety.can_trade());
    }

    #[test]
    fn stays_permissive_with_healthy_win_rate() {
        let safety = SafetySystem::new(config());
        for _ in 0..6 {
            safety.record_trade(Decimal::new(1, 0));
        }
        assert!(safety.can_trade());
    }

    #[test]
    fn trade_pnls_f64_preserves_order_and_values() {
        let safety = SafetySystem::new(config());
        safety.record_trade(Decimal::new(15, 1)); // 1.5
        safety.record_trade(Decimal::new(-25, 1)); // -2.5
        let pnls = safety.trade_pnls_f64();
        assert_eq!(pnls, vec![1.5, -2.5]);
    }
}
