// =============================================================================
// Entry conditions — permissive-by-design signal scoring and position sizing
// =============================================================================
//
// Grounded on SPEC_FULL.md §4.11's "Entry conditions" paragraph, which
// replaces the teacher's `strategy.rs` EMA/RSI/ADX/Bollinger/ROC indicator
// basis with volatility / trend-slope / volume-zscore / sentiment. The exact
// composition of the sentiment score from trend and volume-zscore is an
// implementer choice the source leaves unspecified beyond "a composite
// sentiment score in [0,100]"; this crate combines them linearly around a
// neutral 50 baseline (documented in DESIGN.md).
// =============================================================================

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::exchange::types::Ohlcv;

#[derive(Debug, Clone, Copy)]
pub struct EntrySignal {
    pub sentiment: f64,
    pub volatility: f64,
    pub trend: f64,
    pub volume_zscore: f64,
    pub confidence: f64,
    pub should_enter: bool,
}

/// Hour-of-day aggressiveness factor (UTC band), SPEC_FULL.md §4.11.
pub fn aggressiveness_factor(hour_utc: u32) -> f64 {
    match hour_utc {
        0..=7 => 0.7,   // Asia
        8..=15 => 1.0,  // Europe
        _ => 1.2,       // US
    }
}

/// Evaluates the last 20 one-minute candles (fewer are accepted but widen
/// the noise floor; callers should prefer exactly 20 when available).
pub fn evaluate(candles: &[Ohlcv]) -> EntrySignal {
    if candles.len() < 3 {
        return EntrySignal {
            sentiment: 0.0,
            volatility: 0.0,
            trend: 0.0,
            volume_zscore: 0.0,
            confidence: 0.0,
            should_enter: false,
        };
    }

    let closes: Vec<f64> = candles.iter().filter_map(|c| c.close.to_f64()).collect();
    let volumes: Vec<f64> = candles.iter().filter_map(|c| c.volume.to_f64()).collect();

    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0].abs() > f64::EPSILON)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    let volatility = std_dev(&returns);

    let trend = linreg_slope(&closes) / closes.first().copied().unwrap_or(1.0).max(f64::EPSILON);

    let volume_zscore = if volumes.len() >= 2 {
        let mean = mean(&volumes);
        let sd = std_dev_from_mean(&volumes, mean);
        if sd > f64::EPSILON {
            (volumes.last().copied().unwrap_or(mean) - mean) / sd
        } else {
            0.0
        }
    } else {
        0.0
    };

    let sentiment = (50.0 + trend * 500.0 + volume_zscore * 10.0).clamp(0.0, 100.0);
    let confidence = sentiment / 100.0;

    let should_enter = sentiment > 40.0 && volatility > 1e-4 && confidence > 0.2;

    EntrySignal {
        sentiment,
        volatility,
        trend,
        volume_zscore,
        confidence,
        should_enter,
    }
}

/// Kelly-fraction-lite sizing: `max(0.01, min(0.20, confidence -
/// (1-confidence)/(volatility*100))) * capital`, scaled by hour-of-day
/// aggressiveness, floored at `min_notional`, capped at `budget_cap`.
pub fn position_size(
    signal: &EntrySignal,
    capital: Decimal,
    hour_utc: u32,
    min_notional: Decimal,
    budget_cap: Decimal,
) -> Decimal {
    if signal.volatility <= f64::EPSILON {
        return min_notional.min(budget_cap);
    }

    let raw_fraction = signal.confidence - (1.0 - signal.confidence) / (signal.volatility * 100.0);
    let fraction = raw_fraction.clamp(0.01, 0.20) * aggressiveness_factor(hour_utc);

    let fraction_decimal = Decimal::from_f64_retain(fraction).unwrap_or(Decimal::new(1, 2));
    let sized = capital * fraction_decimal;

    sized.max(min_notional).min(budget_cap)
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn std_dev(xs: &[f64]) -> f64 {
    std_dev_from_mean(xs, mean(xs))
}

fn std_dev_from_mean(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
    variance.sqrt()
}

/// Slope of the ordinary least-squares fit of `ys` against index `0..n`.
fn linreg_slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let xs: Vec<f64> = (0..ys.len()).map(|i| i as f64).collect();
    let x_mean = mean(&xs);
    let y_mean = mean(ys);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        cov += (x - x_mean) * (y - y_mean);
        var_x += (x - x_mean).powi(2);
    }

    if var_x.abs() < f64::EPSILON {
        0.0
    } else {
        cov / var_x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, volume: f64) -> Ohlcv {
        Ohlcv {
            timestamp: 0,
            open: Decimal::from_f64_retain(close).unwrap(),
            high: Decimal::from_f64_retain(close).unwrap(),
            low: Decimal::from_f64_retain(close).unwrap(),
            close: Decimal::from_f64_retain(close).unwrap(),
            volume: Decimal::from_f64_retain(volume).unwrap(),
        }
    }

    #[test]
    fn zero_volatility_candles_reject_entry() {
        let candles: Vec<Ohlcv> = (0..20).map(|_| candle(100.0, 10.0)).collect();
        let signal = evaluate(&candles);
        assert!(!signal.should_enter);
        assert_eq!(signal.volatility, 0.0);
    }

    #[test]
    fn rising_trend_with_volume_spike_can_enter() {
        let mut candles: Vec<Ohlcv> = (0..19).map(|i| candle(100.0 + i as f64 * 0.05, 10.0)).collect();
        candles.push(candle(100.0 + 19.0 * 0.05 + 0.3, 50.0));
        let signal = evaluate(&candles);
        assert!(signal.sentiment > 40.0);
    }

    #[test]
    fn aggressiveness_bands_match_spec() {
        assert_eq!(aggressiveness_factor(3), 0.7);
        assert_eq!(aggressiveness_factor(10), 1.0);
        assert_eq!(aggressiveness_factor(20), 1.2);
    }

    #[test]
    fn position_size_respects_floor_and_cap() {
        let signal = EntrySignal {
            sentiment: 80.0,
            volatility: 0.01,
            trend: 0.01,
            volume_zscore: 1.0,
            confidence: 0.8,
            should_enter: true,
        };
        let sized = position_size(&signal, Decimal::new(10000, 0), 10, Decimal::new(5, 0), Decimal::new(50, 0));
        assert!(sized <= Decimal::new(50, 0));
        assert!(sized >= Decimal::new(5, 0));
    }
}
