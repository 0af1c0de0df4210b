// =============================================================================
// Calculator — rounds (qty, price) and estimates fees for a quote amount
// =============================================================================

use rust_decimal::Decimal;

use crate::exchange::types::{CurrencyPairInfo, OrderType};

#[derive(Debug, Clone, Copy)]
pub struct CalculatedOrder {
    pub qty: Decimal,
    pub price: Decimal,
    pub gross_value: Decimal,
    pub fee_rate: Decimal,
    pub fee_estimated: Decimal,
    /// Whether `fee_rate` reflects the GT-discounted rate (SPEC_FULL.md's
    /// audit-row `gtUsed` field).
    pub gt_used: bool,
}

pub struct Calculator;

impl Calculator {
    pub fn new() -> Self {
        Self
    }

    /// Floors `quote_amount / price` to the pair's amount precision, rounds
    /// `price` to 8 digits (glossary: money fields throughout this crate use
    /// 8-decimal precision), and estimates the fee at `fee_rate`.
    pub fn calculate(
        &self,
        quote_amount: Decimal,
        price: Decimal,
        pair_info: &CurrencyPairInfo,
        fee_rate: Decimal,
        gt_used: bool,
        _order_type: OrderType,
    ) -> CalculatedOrder {
        let rounded_price = price.round_dp(8);

        let raw_qty = quote_amount / rounded_price;
        let qty = raw_qty.trunc_with_scale(pair_info.amount_precision.min(8));

        let gross_value = qty * rounded_price;
        let fee_estimated = gross_value * fee_rate;

        CalculatedOrder {
            qty,
            price: rounded_price,
            gross_value,
            fee_rate,
            fee_estimated,
            gt_used,
        }
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_info() -> CurrencyPairInfo {
        CurrencyPairInfo {
            min_notional: Decimal::new(5, 0),
            amount_precision: 6,
            price_precision: 2,
        }
    }

    #[test]
    fn floors_quantity_to_amount_precision() {
        let calc = Calculator::new();
        let result = calc.calculate(
            Decimal::new(50, 0),
            Decimal::new(20000, 0),
            &pair_info(),
            Decimal::new(2, 3),
            false,
            OrderType::Limit,
        );
        // 50 / 20000 = 0.0025 exactly, within 6dp precision.
        assert_eq!(result.qty, Decimal::new(25, 4));
        assert_eq!(result.gross_value, result.qty * result.price);
        assert!(!result.gt_used);
    }

    #[test]
    fn fee_estimated_scales_with_gross_value_and_rate() {
        let calc = Calculator::new();
        let result = calc.calculate(
            Decimal::new(100, 0),
            Decimal::new(100, 0),
            &pair_info(),
            Decimal::new(1, 2), // 1%
            false,
            OrderType::Market,
        );
        assert_eq!(result.gross_value, Decimal::new(100, 0));
        assert_eq!(result.fee_estimated, Decimal::new(1, 0));
    }

    #[test]
    fn gt_used_flag_is_carried_through() {
        let calc = Calculator::new();
        let result = calc.calculate(
            Decimal::new(100, 0),
            Decimal::new(100, 0),
            &pair_info(),
            Decimal::new(16, 3), // 1.6%, GT-discounted
            true,
            OrderType::Market,
        );
        assert!(result.gt_used);
    }
}
