// =============================================================================
// Presets — conservative / moderate / aggressive complete configs
// =============================================================================
//
// Builds a fully valid `ConfigModel` from just `(pair, budget)`, mirroring
// `session_manager.py`'s bot-registration defaults (a new bot is usually
// started from one of a handful of risk profiles, not a hand-edited JSON
// file).
// =============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::dca::DcaConfigModel;
use super::performance::PerformanceConfig;
use super::security::SecurityConfig;
use super::trading::TradingConfig;
use super::{ConfigMetadata, ConfigModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Preset {
    Conservative,
    Moderate,
    Aggressive,
}

impl Default for Preset {
    fn default() -> Self {
        Self::Moderate
    }
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        }
    }

    pub fn build(&self, pair: impl Into<String>, budget: Decimal) -> ConfigModel {
        let pair = pair.into();
        let model = match self {
            Self::Conservative => ConfigModel {
                trading: TradingConfig {
                    pair: pair.clone(),
                    budget_per_trade: budget,
                    target_profit_pct: Decimal::new(8, 1), // 0.8%
                    stop_loss_pct: Decimal::new(80, 1),    // 8.0%
                    position_timeout_secs: 3600,
                },
                security: SecurityConfig {
                    max_trade_amount: budget * Decimal::new(2, 0),
                    max_daily_loss: budget * Decimal::new(2, 1), // 20% of budget
                    min_win_rate: 0.4,
                    min_trades_for_win_rate_check: 5,
                },
                dca: DcaConfigModel {
                    level1_trigger_pct: Decimal::new(-15, 1), // -1.5%
                    level1_multiplier: Decimal::new(15, 1),   // 1.5x
                    level2_trigger_pct: Decimal::new(-4, 0),  // -4%
                    level2_multiplier: Decimal::new(2, 0),
                    stop_loss_trigger_pct: Decimal::new(-8, 0),
                },
                performance: PerformanceConfig {
                    production_circuit_breaker: true,
                    ..PerformanceConfig::default()
                },
                metadata: ConfigMetadata::default(),
            },
            Self::Moderate => ConfigModel {
                trading: TradingConfig {
                    pair: pair.clone(),
                    budget_per_trade: budget,
                    target_profit_pct: Decimal::new(1, 0), // 1.0%
                    stop_loss_pct: Decimal::new(10, 0),    // 10.0%
                    position_timeout_secs: 0,
                },
                security: SecurityConfig {
                    max_trade_amount: budget * Decimal::new(3, 0),
                    max_daily_loss: budget * Decimal::new(3, 1),
                    min_win_rate: 0.3,
                    min_trades_for_win_rate_check: 5,
                },
                dca: DcaConfigModel::default(),
                performance: PerformanceConfig::default(),
                metadata: ConfigMetadata::default(),
            },
            Self::Aggressive => ConfigModel {
                trading: TradingConfig {
                    pair: pair.clone(),
                    budget_per_trade: budget,
                    target_profit_pct: Decimal::new(15, 1), // 1.5%
                    stop_loss_pct: Decimal::new(12, 0),     // 12.0%
                    position_timeout_secs: 0,
                },
                security: SecurityConfig {
                    max_trade_amount: budget * Decimal::new(5, 0),
                    max_daily_loss: budget * Decimal::new(4, 1),
                    min_win_rate: 0.25,
                    min_trades_for_win_rate_check: 8,
                },
                dca: DcaConfigModel {
                    level1_trigger_pct: Decimal::new(-3, 0),
                    level1_multiplier: Decimal::new(25, 1), // 2.5x
                    level2_trigger_pct: Decimal::new(-7, 0),
                    level2_multiplier: Decimal::new(4, 0),
                    stop_loss_trigger_pct: Decimal::new(-12, 0),
                },
                performance: PerformanceConfig::default(),
                metadata: ConfigMetadata::default(),
            },
        };
        ConfigModel {
            metadata: ConfigMetadata { preset: Some(self.as_str().to_string()), ..model.metadata },
            ..model
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_builds_a_config_that_validates() {
        for preset in [Preset::Conservative, Preset::Moderate, Preset::Aggressive] {
            let cfg = preset.build("BTC_USDT", Decimal::new(50, 0));
            assert!(cfg.validate().is_ok(), "{:?} preset failed validation", preset);
            assert_eq!(cfg.metadata.preset.as_deref(), Some(preset.as_str()));
        }
    }

    #[test]
    fn aggressive_targets_a_higher_profit_than_conservative() {
        let budget = Decimal::new(50, 0);
        let conservative = Preset::Conservative.build("BTC_USDT", budget);
        let aggressive = Preset::Aggressive.build("BTC_USDT", budget);
        assert!(aggressive.trading.target_profit_pct > conservative.trading.target_profit_pct);
    }
}
