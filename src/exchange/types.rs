// =============================================================================
// Typed Gate.io v4 response shapes
// =============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::Market => "market",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTicker {
    pub currency_pair: String,
    pub last: String,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
struct RawOrderBook {
    #[serde(default)]
    bids: Vec<[String; 2]>,
    #[serde(default)]
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    fn from_raw(raw: RawOrderBook) -> Self {
        let parse = |rows: Vec<[String; 2]>| -> Vec<OrderBookLevel> {
            rows.into_iter()
                .filter_map(|[p, s]| {
                    Some(OrderBookLevel {
                        price: p.parse().ok()?,
                        size: s.parse().ok()?,
                    })
                })
                .collect()
        };
        Self {
            bids: parse(raw.bids),
            asks: parse(raw.asks),
        }
    }
}

impl<'de> Deserialize<'de> for OrderBook {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        RawOrderBook::deserialize(deserializer).map(OrderBook::from_raw)
    }
}

/// One OHLCV bar. Gate.io returns candlesticks as an array of strings
/// `[timestamp, volume, close, high, low, open]`.
#[derive(Debug, Clone, Copy)]
pub struct Ohlcv {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBalance {
    pub currency: String,
    pub available: String,
    #[serde(default)]
    pub locked: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTrade {
    pub id: String,
    pub order_id: String,
    pub create_time: String,
    pub currency_pair: String,
    pub side: String,
    pub price: String,
    pub amount: String,
    pub fee: String,
    pub fee_currency: String,
}

/// One fill row as §4.8's `listBuyFills` shape.
#[derive(Debug, Clone)]
pub struct Fill {
    pub order_id: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub value: Decimal,
    pub ts: i64,
    pub fee: Decimal,
    pub fee_currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOrder {
    pub id: String,
    pub currency_pair: String,
    pub status: String,
    pub side: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub filled_total: String,
    #[serde(default, rename = "left")]
    pub left: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderResponse {
    pub order_id: String,
    pub status: String,
    pub price: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCurrencyPair {
    pub id: String,
    #[serde(default)]
    pub min_base_amount: Option<String>,
    #[serde(default)]
    pub min_quote_amount: Option<String>,
    #[serde(default)]
    pub amount_precision: Option<u32>,
    #[serde(default)]
    pub precision: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct CurrencyPairInfo {
    pub min_notional: Decimal,
    pub amount_precision: u32,
    pub price_precision: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFeeRates {
    #[serde(default)]
    pub maker_fee: Option<String>,
    #[serde(default)]
    pub taker_fee: Option<String>,
    #[serde(default)]
    pub gt_discount: Option<bool>,
}

#[derive(Debug, Clone, Copy)]
pub struct FeeRates {
    pub maker: Decimal,
    pub taker: Decimal,
    pub gt_discount_enabled: bool,
}
