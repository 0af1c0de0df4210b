// =============================================================================
// ConfigModel — composite validated configuration
// =============================================================================
//
// Generalizes the teacher's `runtime_config.rs` single-struct, serde-default,
// atomic-save idiom into the composite `{trading, security, dca, performance,
// metadata}` shape of SPEC_FULL.md §4.15. Each sub-config validates
// independently; `ConfigModel::validate` adds the two cross-field checks the
// spec names explicitly.
// =============================================================================

pub mod dca;
pub mod performance;
pub mod presets;
pub mod security;
pub mod trading;

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use dca::DcaConfigModel;
pub use performance::PerformanceConfig;
pub use security::SecurityConfig;
pub use trading::TradingConfig;

fn now() -> DateTime<Utc> {
    Utc::now()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMetadata {
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        Self {
            created_at: now(),
            preset: None,
            version: default_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigModel {
    pub trading: TradingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub dca: DcaConfigModel,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub metadata: ConfigMetadata,
}

impl ConfigModel {
    /// Validates each sub-config independently, then the two cross-field
    /// rules SPEC_FULL.md §4.15 names explicitly.
    pub fn validate(&self) -> Result<()> {
        self.trading.validate().context("trading config invalid")?;
        self.security.validate().context("security config invalid")?;
        self.dca.validate().context("dca config invalid")?;
        self.performance.validate().context("performance config invalid")?;

        if self.trading.stop_loss_pct <= self.trading.target_profit_pct {
            bail!(
                "stopLoss% ({}) must exceed targetProfit% ({})",
                self.trading.stop_loss_pct,
                self.trading.target_profit_pct
            );
        }
        if self.security.max_trade_amount < self.trading.budget_per_trade {
            bail!(
                "security.maxTradeAmount ({}) must be >= trading.budgetPerTrade ({})",
                self.security.max_trade_amount,
                self.trading.budget_per_trade
            );
        }
        // Hard stop magnitude should agree with the DCA ladder's own stop
        // loss trigger, since TradingEngine's safety system reads the latter.
        if self.trading.stop_loss_pct.abs() < self.dca.stop_loss_trigger_pct.abs() {
            bail!(
                "trading.stopLossPct ({}) must be >= |dca.stopLossTriggerPct| ({})",
                self.trading.stop_loss_pct,
                self.dca.stop_loss_trigger_pct
            );
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Atomic write: tmp sibling file, then rename — same idiom as the
    /// teacher's `RuntimeConfig::save`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.validate()?;
        let content = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn base(pair: &str) -> ConfigModel {
        ConfigModel {
            trading: TradingConfig { pair: pair.to_string(), ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn default_config_for_a_valid_pair_passes_validation() {
        assert!(base("BTC_USDT").validate().is_ok());
    }

    #[test]
    fn rejects_stop_loss_not_exceeding_target_profit() {
        let mut cfg = base("BTC_USDT");
        cfg.trading.stop_loss_pct = Decimal::new(5, 1); // 0.5% < 1.0% target
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_max_trade_amount_below_budget_per_trade() {
        let mut cfg = base("BTC_USDT");
        cfg.security.max_trade_amount = Decimal::new(10, 0);
        cfg.trading.budget_per_trade = Decimal::new(50, 0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_round_trip_preserves_values() {
        let cfg = base("ETH_USDT");
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ConfigModel = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.trading.pair, back.trading.pair);
        assert_eq!(cfg.trading.budget_per_trade, back.trading.budget_per_trade);
        assert_eq!(cfg.dca.level1_trigger_pct, back.dca.level1_trigger_pct);
    }

    #[test]
    fn empty_json_with_only_pair_fills_all_defaults() {
        let json = r#"{"trading":{"pair":"BTC_USDT"}}"#;
        let cfg: ConfigModel = serde_json::from_str(json).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.security.min_win_rate, 0.3);
    }
}
