// =============================================================================
// DcaConfigModel — the config-layer counterpart of `engine::dca::DcaConfig`
// =============================================================================
//
// Kept distinct from `engine::dca::DcaConfig` (which is the in-memory ladder
// constructor) because this one round-trips through JSON/presets and carries
// its own validation; `TradingEngine::new` converts one into the other.
// =============================================================================

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_level1_trigger_pct() -> Decimal {
    Decimal::new(-2, 0)
}

fn default_level1_multiplier() -> Decimal {
    Decimal::new(2, 0)
}

fn default_level2_trigger_pct() -> Decimal {
    Decimal::new(-5, 0)
}

fn default_level2_multiplier() -> Decimal {
    Decimal::new(3, 0)
}

fn default_stop_loss_trigger_pct() -> Decimal {
    Decimal::new(-10, 0)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcaConfigModel {
    #[serde(default = "default_level1_trigger_pct")]
    pub level1_trigger_pct: Decimal,
    #[serde(default = "default_level1_multiplier")]
    pub level1_multiplier: Decimal,
    #[serde(default = "default_level2_trigger_pct")]
    pub level2_trigger_pct: Decimal,
    #[serde(default = "default_level2_multiplier")]
    pub level2_multiplier: Decimal,
    /// Level 3; multiplier is always 0 (a sell, not a buy) per the glossary
    /// ("Level 3 with multiplier 0 denotes a stop-loss").
    #[serde(default = "default_stop_loss_trigger_pct")]
    pub stop_loss_trigger_pct: Decimal,
}

impl Default for DcaConfigModel {
    fn default() -> Self {
        Self {
            level1_trigger_pct: default_level1_trigger_pct(),
            level1_multiplier: default_level1_multiplier(),
            level2_trigger_pct: default_level2_trigger_pct(),
            level2_multiplier: default_level2_multiplier(),
            stop_loss_trigger_pct: default_stop_loss_trigger_pct(),
        }
    }
}

impl DcaConfigModel {
    pub fn validate(&self) -> Result<()> {
        if self.level1_trigger_pct >= Decimal::ZERO {
            bail!("level1_trigger_pct must be negative");
        }
        if self.level2_trigger_pct >= self.level1_trigger_pct {
            bail!("level2_trigger_pct must be a deeper loss than level1_trigger_pct");
        }
        if self.stop_loss_trigger_pct >= self.level2_trigger_pct {
            bail!("stop_loss_trigger_pct must be a deeper loss than level2_trigger_pct");
        }
        if self.level1_multiplier < Decimal::ZERO || self.level2_multiplier < Decimal::ZERO {
            bail!("DCA multipliers must be non-negative");
        }
        Ok(())
    }

    pub fn to_ladder_config(self) -> crate::engine::dca::DcaConfig {
        crate::engine::dca::DcaConfig {
            level1_trigger_pct: self.level1_trigger_pct,
            level1_multiplier: self.level1_multiplier,
            level2_trigger_pct: self.level2_trigger_pct,
            level2_multiplier: self.level2_multiplier,
            stop_loss_trigger_pct: self.stop_loss_trigger_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_must_deepen_in_order() {
        let mut cfg = DcaConfigModel::default();
        cfg.level2_trigger_pct = Decimal::new(-1, 0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_is_valid() {
        assert!(DcaConfigModel::default().validate().is_ok());
    }
}
