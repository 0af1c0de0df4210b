// =============================================================================
// SecurityConfig — hard ceilings independent of any single trade's sizing
// =============================================================================

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_max_trade_amount() -> Decimal {
    Decimal::new(200, 0)
}

fn default_max_daily_loss() -> Decimal {
    Decimal::new(20, 0)
}

fn default_min_win_rate() -> f64 {
    0.3
}

fn default_min_trades_for_win_rate_check() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Absolute ceiling on any single order's quote value, independent of
    /// `trading.budgetPerTrade` (cross-validated against it, §4.15).
    #[serde(default = "default_max_trade_amount")]
    pub max_trade_amount: Decimal,

    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,

    #[serde(default = "default_min_win_rate")]
    pub min_win_rate: f64,

    #[serde(default = "default_min_trades_for_win_rate_check")]
    pub min_trades_for_win_rate_check: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_trade_amount: default_max_trade_amount(),
            max_daily_loss: default_max_daily_loss(),
            min_win_rate: default_min_win_rate(),
            min_trades_for_win_rate_check: default_min_trades_for_win_rate_check(),
        }
    }
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_trade_amount <= Decimal::ZERO {
            bail!("max_trade_amount must be positive");
        }
        if self.max_daily_loss <= Decimal::ZERO {
            bail!("max_daily_loss must be positive");
        }
        if !(0.0..=1.0).contains(&self.min_win_rate) {
            bail!("min_win_rate must be in [0, 1]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_win_rate() {
        let cfg = SecurityConfig { min_win_rate: 1.5, ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
