// =============================================================================
// State machine types — waitingToBuy / positionOpen / waitingForSell
// =============================================================================
//
// Grounded on teacher's `position_engine.rs` (`Position` struct, serde-default
// mutable fields), restructured around the DCA ladder and the virtual-entry
// policy of SPEC_FULL.md §4.11.
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::dca::DcaLadder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineState {
    WaitingToBuy,
    PositionOpen,
    WaitingForSell,
}

#[derive(Debug, Clone)]
pub struct Position {
    pub original_entry: Decimal,
    /// Running qty-weighted VWAP of the original fill plus every DCA fill.
    /// Equals `original_entry` until the first DCA level activates.
    pub vwap: Decimal,
    pub qty: Decimal,
    pub dca: DcaLadder,
    pub opened_at: DateTime<Utc>,
    pub sell_order_id: Option<String>,
    /// 2-consecutive-poll hysteresis counter for the `waitingForSell ->
    /// positionOpen` race (§4.11 open-question resolution).
    pub missing_sell_polls: u32,
    /// Whether this position was adopted from a pre-existing base balance on
    /// restart rather than filled by this process (virtual entry, §4.11).
    pub is_virtual_entry: bool,
}

impl Position {
    pub fn new_real(entry: Decimal, qty: Decimal, dca: DcaLadder) -> Self {
        Self {
            original_entry: entry,
            vwap: entry,
            qty,
            dca,
            opened_at: Utc::now(),
            sell_order_id: None,
            missing_sell_polls: 0,
            is_virtual_entry: false,
        }
    }

    pub fn new_virtual(current_market_price: Decimal, qty: Decimal, dca: DcaLadder) -> Self {
        Self {
            original_entry: current_market_price,
            vwap: current_market_price,
            qty,
            dca,
            opened_at: Utc::now(),
            sell_order_id: None,
            missing_sell_polls: 0,
            is_virtual_entry: true,
        }
    }

    /// Rescales `vwap` against a DCA fill and grows `qty` by the fill. Called
    /// once per DCA level trigger, in the order levels activate.
    pub fn record_dca_fill(&mut self, fill_price: Decimal, fill_qty: Decimal) {
        self.vwap = super::dca::rescale_vwap(self.vwap, self.qty, fill_price, fill_qty);
        self.qty += fill_qty;
    }

    /// Running VWAP of all fills if any DCA level has activated, otherwise
    /// the original fill price (glossary: "Effective entry").
    pub fn effective_entry(&self) -> Decimal {
        if self.dca.level1.activated || self.dca.level2.activated {
            self.vwap
        } else {
            self.original_entry
        }
    }

    /// P&L% against `effective_entry`, not the raw market delta — DCA
    /// rescaling deliberately resets "loss %" after a fill (§4.11).
    pub fn pnl_pct(&self, current_price: Decimal) -> Decimal {
        let effective_entry = self.effective_entry();
        if effective_entry <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (current_price - effective_entry) / effective_entry * Decimal::new(100, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dca::DcaConfig;

    #[test]
    fn effective_entry_is_original_fill_before_any_dca() {
        let pos = Position::new_real(Decimal::new(3000, 0), Decimal::new(1, 1), DcaLadder::new(DcaConfig::default()));
        assert_eq!(pos.effective_entry(), Decimal::new(3000, 0));
    }

    #[test]
    fn effective_entry_switches_to_vwap_after_dca() {
        let mut pos = Position::new_real(Decimal::new(3000, 0), Decimal::new(1, 1), DcaLadder::new(DcaConfig::default()));
        pos.record_dca_fill(Decimal::new(2900, 0), Decimal::new(1, 1));
        pos.dca.activate_level1();
        assert!(pos.effective_entry() < Decimal::new(3000, 0));
    }

    #[test]
    fn pnl_pct_matches_direct_formula() {
        let pos = Position::new_real(Decimal::new(100, 0), Decimal::new(1, 0), DcaLadder::new(DcaConfig::default()));
        let pct = pos.pnl_pct(Decimal::new(110, 0));
        assert_eq!(pct, Decimal::new(10, 0));
    }

    #[test]
    fn virtual_entry_uses_current_market_price() {
        let pos = Position::new_virtual(Decimal::new(21000, 0), Decimal::new(2, 3), DcaLadder::new(DcaConfig::default()));
        assert!(pos.is_virtual_entry);
        assert_eq!(pos.original_entry, Decimal::new(21000, 0));
    }
}
