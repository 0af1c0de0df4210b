// =============================================================================
// TradingConfig — per-pair entry/exit sizing parameters
// =============================================================================

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_target_profit_pct() -> Decimal {
    Decimal::new(10, 1) // 1.0%
}

fn default_budget_per_trade() -> Decimal {
    Decimal::new(50, 0)
}

fn default_position_timeout_secs() -> u64 {
    0
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::new(100, 1) // 10.0%, magnitude
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingConfig {
    pub pair: String,

    #[serde(default = "default_budget_per_trade")]
    pub budget_per_trade: Decimal,

    #[serde(default = "default_target_profit_pct")]
    pub target_profit_pct: Decimal,

    /// Magnitude of the hard stop, e.g. `10.0` for -10%. Compared against
    /// the DCA ladder's `stop_loss_trigger_pct` at cross-validation time
    /// (SPEC_FULL.md §4.15: `stopLoss% > targetProfit%`).
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,

    /// Position-open timeout in seconds; 0 disables (§5 "Timeouts").
    #[serde(default = "default_position_timeout_secs")]
    pub position_timeout_secs: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            pair: String::new(),
            budget_per_trade: default_budget_per_trade(),
            target_profit_pct: default_target_profit_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            position_timeout_secs: default_position_timeout_secs(),
        }
    }
}

impl TradingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pair.split('_').count() != 2 {
            bail!("pair must be of the form BASE_QUOTE, got {:?}", self.pair);
        }
        if self.budget_per_trade <= Decimal::ZERO {
            bail!("budget_per_trade must be positive");
        }
        if self.target_profit_pct <= Decimal::ZERO {
            bail!("target_profit_pct must be positive");
        }
        if self.stop_loss_pct <= Decimal::ZERO {
            bail!("stop_loss_pct must be positive (magnitude)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_pair() {
        let cfg = TradingConfig { pair: "BTCUSDT".into(), ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_is_valid_once_pair_is_set() {
        let cfg = TradingConfig { pair: "BTC_USDT".into(), ..Default::default() };
        assert!(cfg.validate().is_ok());
    }
}
