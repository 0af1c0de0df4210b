// =============================================================================
// Validator — positive balance, sufficiency, minimum-notional checks
// =============================================================================

use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::exchange::types::CurrencyPairInfo;

/// Safety margin applied on top of the exchange's published minimum notional,
/// matching `exchange::MIN_NOTIONAL_SAFETY_MARGIN`.
const MIN_NOTIONAL_SAFETY_MARGIN: Decimal = Decimal::from_parts(115, 0, 0, false, 2);

pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// `requested` and `available` are both quote-currency amounts.
    pub fn validate(
        &self,
        requested: Decimal,
        available: Decimal,
        price: Decimal,
        pair_info: &CurrencyPairInfo,
    ) -> Result<(), EngineError> {
        if requested <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "requested amount must be positive, got {requested}"
            )));
        }

        if available < requested {
            return Err(EngineError::InsufficientBalance {
                needed: requested.to_string(),
                available: available.to_string(),
            });
        }

        let floor = pair_info.min_notional * MIN_NOTIONAL_SAFETY_MARGIN;
        if requested < floor {
            return Err(EngineError::MinOrderValue {
                value: requested.to_string(),
                minimum: floor.to_string(),
            });
        }

        if price <= Decimal::ZERO {
            return Err(EngineError::Validation(format!("price must be positive, got {price}")));
        }

        Ok(())
    }
}

impl Default for Validator {
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
    fn rejects_negative_or_zero_amount() {
        let v = Validator::new();
        let err = v
            .validate(Decimal::ZERO, Decimal::new(100, 0), Decimal::new(20000, 0), &pair_info())
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Validation);
    }

    #[test]
    fn rejects_insufficient_balance() {
        let v = Validator::new();
        let err = v
            .validate(Decimal::new(50, 0), Decimal::new(10, 0), Decimal::new(20000, 0), &pair_info())
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::InsufficientBalance);
    }

    #[test]
    fn rejects_sub_minimum_notional() {
        let v = Validator::new();
        // 5 * 1.15 = 5.75 floor; 5.0 requested is below it.
        let err = v
            .validate(Decimal::new(5, 0), Decimal::new(100, 0), Decimal::new(20000, 0), &pair_info())
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::MinOrderValue);
    }

    #[test]
    fn accepts_valid_order() {
        let v = Validator::new();
        assert!(v
            .validate(Decimal::new(50, 0), Decimal::new(100, 0), Decimal::new(20000, 0), &pair_info())
            .is_ok());
    }
}
