// =============================================================================
// DcaLadder — two buy-in levels plus a stop-loss trigger
// =============================================================================
//
// Dollar-cost averaging on unrealized loss (glossary). `activated` flags are
// write-once-true for the life of a position: nothing in this type exposes a
// way to flip one back to `false` (§8 "DCA monotonicity").
// =============================================================================

use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
pub struct DcaLevel {
    pub trigger_pct: Decimal,
    pub multiplier: Decimal,
    pub activated: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DcaConfig {
    pub level1_trigger_pct: Decimal,
    pub level1_multiplier: Decimal,
    pub level2_trigger_pct: Decimal,
    pub level2_multiplier: Decimal,
    pub stop_loss_trigger_pct: Decimal,
}

impl Default for DcaConfig {
    fn default() -> Self {
        Self {
            level1_trigger_pct: Decimal::new(-2, 0),
            level1_multiplier: Decimal::new(2, 0),
            level2_trigger_pct: Decimal::new(-5, 0),
            level2_multiplier: Decimal::new(3, 0),
            stop_loss_trigger_pct: Decimal::new(-10, 0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DcaLadder {
    pub level1: DcaLevel,
    pub level2: DcaLevel,
    pub stop_loss_trigger_pct: Decimal,
}

impl DcaLadder {
    pub fn new(config: DcaConfig) -> Self {
        Self {
            level1: DcaLevel {
                trigger_pct: config.level1_trigger_pct,
                multiplier: config.level1_multiplier,
                activated: false,
            },
            level2: DcaLevel {
                trigger_pct: config.level2_trigger_pct,
                multiplier: config.level2_multiplier,
                activated: false,
            },
            stop_loss_trigger_pct: config.stop_loss_trigger_pct,
        }
    }

    pub fn activate_level1(&mut self) {
        self.level1.activated = true;
    }

    pub fn activate_level2(&mut self) {
        self.level2.activated = true;
    }

    /// `level1 and level1 not activated` / `level2 activated, level1 only`
    /// gating from the transition table.
    pub fn should_activate_level1(&self, pnl_pct: Decimal) -> bool {
        !self.level1.activated && pnl_pct <= self.level1.trigger_pct
    }

    pub fn should_activate_level2(&self, pnl_pct: Decimal) -> bool {
        self.level1.activated && !self.level2.activated && pnl_pct <= self.level2.trigger_pct
    }

    pub fn should_stop_loss(&self, pnl_pct: Decimal) -> bool {
        pnl_pct <= self.stop_loss_trigger_pct
    }
}

/// VWAP-rescales the position entry after a DCA fill: `(entry*qty +
/// fill_price*fill_qty) / (qty + fill_qty)`.
pub fn rescale_vwap(entry: Decimal, qty: Decimal, fill_price: Decimal, fill_qty: Decimal) -> Decimal {
    let total_qty = qty + fill_qty;
    if total_qty <= Decimal::ZERO {
        return entry;
    }
    (entry * qty + fill_price * fill_qty) / total_qty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level1_activates_before_level2() {
        let mut ladder = DcaLadder::new(DcaConfig::default());
        assert!(ladder.should_activate_level1(Decimal::new(-3, 0)));
        assert!(!ladder.should_activate_level2(Decimal::new(-6, 0)));
        ladder.activate_level1();
        assert!(ladder.should_activate_level2(Decimal::new(-6, 0)));
    }

    #[test]
    fn activation_is_monotonic() {
        let mut ladder = DcaLadder::new(DcaConfig::default());
        ladder.activate_level1();
        assert!(ladder.level1.activated);
        // No method exists to clear it; re-activating is a no-op.
        ladder.activate_level1();
        assert!(ladder.level1.activated);
    }

    #[test]
    fn stop_loss_trigger_independent_of_ladder_state() {
        let ladder = DcaLadder::new(DcaConfig::default());
        assert!(ladder.should_stop_loss(Decimal::new(-11, 0)));
        assert!(!ladder.should_stop_loss(Decimal::new(-9, 0)));
    }

    #[test]
    fn vwap_matches_dca_rescue_scenario() {
        // Fill 1: 100 USDT @ 3000, fill 2: 200 USDT @ 2940 (qty-weighted).
        let qty1 = Decimal::new(100, 0) / Decimal::new(3000, 0);
        let qty2 = Decimal::new(200, 0) / Decimal::new(2940, 0);
        let vwap = rescale_vwap(Decimal::new(3000, 0), qty1, Decimal::new(2940, 0), qty2);
        assert!(vwap < Decimal::new(3000, 0));
        assert!(vwap > Decimal::new(2900, 0));
    }
}
