// =============================================================================
// ExchangeClient — signed Gate.io v4 REST client
// =============================================================================
//
// Restructures the teacher's `binance/client.rs` (reqwest client shape,
// `#[instrument]` per call, `anyhow::Context`/`bail!`, redacting `Debug`) for
// Gate.io's endpoint set and HMAC-SHA512 signing. Every call is routed
// through EndpointClassifier + RateLimitEnforcer before it is attempted, and
// through RetryManager for the retryable categories. 5s/10s response caches
// live in front of the hot read paths per SPEC_FULL.md §4.8.
// =============================================================================

pub mod signing;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{EngineError, ErrorCategory};
use crate::rate_limit::{RateLimitEnforcer, RateLimitCategory};
use crate::retry::{RetryManager, RetryOutcome};
use crate::safe_sleep::SafeSleepManager;
use crate::smart_cache::SmartCache;

use types::*;

const BASE_URL: &str = "https://api.gateio.ws/api/v4";
const TICKER_TTL: Duration = Duration::from_secs(5);
const ORDER_BOOK_TTL: Duration = Duration::from_secs(5);
const CANDLE_TTL: Duration = Duration::from_secs(10);
const BALANCE_TTL: Duration = Duration::from_secs(5);
const PAIR_INFO_TTL: Duration = Duration::from_secs(3600);
const FEE_RATES_TTL: Duration = Duration::from_secs(60);

/// Safety margin applied on top of the exchange's published `minNotional`
/// (glossary: "Minimum notional"). Orders under `minNotional * margin` are
/// refused locally before any HTTP call is made.
const MIN_NOTIONAL_SAFETY_MARGIN: Decimal = Decimal::from_parts(115, 0, 0, false, 2); // 1.15

pub struct ExchangeClient {
    api_key: String,
    secret: String,
    base_url: String,
    client: reqwest::Client,
    limiter: RateLimitEnforcer,
    retry: RetryManager,

    ticker_cache: SmartCache<String, Decimal>,
    order_book_cache: SmartCache<String, OrderBook>,
    candle_cache: SmartCache<(String, String, u32), Vec<Ohlcv>>,
    balance_cache: SmartCache<String, Decimal>,
    fills_cache: SmartCache<String, Vec<Fill>>,
    pair_info_cache: SmartCache<String, CurrencyPairInfo>,
    fee_rates_cache: SmartCache<(), FeeRates>,
}

impl ExchangeClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, sleeper: Arc<SafeSleepManager>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: BASE_URL.to_string(),
            client,
            limiter: RateLimitEnforcer::new(),
            retry: RetryManager::new(crate::retry::RetryConfig::gate_io(), sleeper),
            ticker_cache: SmartCache::new(),
            order_book_cache: SmartCache::new(),
            candle_cache: SmartCache::new(),
            balance_cache: SmartCache::new(),
            fills_cache: SmartCache::new(),
            pair_info_cache: SmartCache::new(),
            fee_rates_cache: SmartCache::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    fn headers(&self, signed: bool, timestamp: u64, sign: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        if signed {
            if let Ok(v) = HeaderValue::from_str(&self.api_key) {
                headers.insert("KEY", v);
            }
            if let Ok(v) = HeaderValue::from_str(&timestamp.to_string()) {
                headers.insert("Timestamp", v);
            }
            if let Ok(v) = HeaderValue::from_str(sign) {
                headers.insert("SIGN", v);
            }
            headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        }
        headers
    }

    /// Performs one HTTP attempt (no retry) and classifies the outcome.
    async fn attempt(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &str,
        signed: bool,
    ) -> Result<Value, EngineError> {
        let full_path = format!("/api/v4{path}");
        let timestamp = signing::timestamp_secs();
        let sign = if signed {
            signing::sign(&self.secret, method, &full_path, query, body, timestamp)
        } else {
            String::new()
        };

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        let mut builder = self
            .client
            .request(
                method.parse().map_err(|_| EngineError::Validation(format!("bad method {method}")))?,
                &url,
            )
            .headers(self.headers(signed, timestamp, &sign));

        if !body.is_empty() {
            builder = builder.body(body.to_string());
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Timeout(e.to_string())
            } else {
                EngineError::Network(e.to_string())
            }
        })?;

        let status = resp.status();
        let retry_after_header = resp
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());

        let text = resp.text().await.unwrap_or_default();
        let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(parsed);
        }

        let category = classify_status(status.as_u16(), &text);
        Err(match category {
            ErrorCategory::RateLimit => EngineError::RateLimit {
                retry_after: retry_after_header,
            },
            ErrorCategory::Server => EngineError::Server {
                status: status.as_u16(),
                body: text,
            },
            ErrorCategory::Timeout => EngineError::Timeout(text),
            ErrorCategory::Network => EngineError::Network(text),
            _ => EngineError::Api { body: text },
        })
    }

    /// Runs `attempt` through the endpoint classifier, rate limiter, and
    /// retry manager. This is the single call-site every public operation
    /// below funnels through.
    async fn call(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &str,
        signed: bool,
    ) -> Result<Value, EngineError> {
        let category = self.limiter.classify(path, method);
        if !self.limiter.can_make_request(category) {
            let wait = self.limiter.time_until_next_request(category);
            warn!(path, method, wait, "local rate limiter saturated, refusing call");
            return Err(EngineError::RateLimit { retry_after: Some(wait) });
        }

        let outcome = self
            .retry
            .execute_with_retry(
                path,
                || async {
                    self.limiter.record_request(category);
                    self.attempt(method, path, query, body, signed).await
                },
                |e: &EngineError| e.category(),
                |e: &EngineError| match e {
                    EngineError::RateLimit { retry_after } => *retry_after,
                    _ => None,
                },
            )
            .await;

        match outcome {
            RetryOutcome::Success(v) => Ok(v),
            RetryOutcome::SkippedRateLimited => Err(EngineError::RateLimit { retry_after: None }),
            RetryOutcome::Exhausted(category, message) => Err(reconstruct(category, message)),
        }
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    #[instrument(skip(self), name = "exchange::get_ticker")]
    pub async fn get_ticker(&self, pair: &str) -> Result<Option<Decimal>, EngineError> {
        if let Some(price) = self.ticker_cache.get(&pair.to_string(), TICKER_TTL) {
            return Ok(Some(price));
        }

        let query = format!("currency_pair={pair}");
        let body = self.call("GET", "/spot/tickers", &query, "", false).await?;
        let rows: Vec<RawTicker> = serde_json::from_value(body)
            .map_err(|e| EngineError::Unknown(format!("malformed ticker response: {e}")))?;

        let price = rows
            .into_iter()
            .find(|t| t.currency_pair == pair)
            .and_then(|t| t.last.parse::<Decimal>().ok());

        if let Some(p) = price {
            self.ticker_cache.set(pair.to_string(), p);
        }
        Ok(price)
    }

    /// Non-fetching read of whatever ticker price is currently cached (within
    /// `TICKER_TTL`), for synchronous callers like status snapshots that
    /// can't await a fresh HTTP round-trip. Returns `None` on a cold/expired
    /// cache rather than making a request.
    pub fn peek_ticker(&self, pair: &str) -> Option<Decimal> {
        self.ticker_cache.get(&pair.to_string(), TICKER_TTL)
    }

    #[instrument(skip(self), name = "exchange::get_order_book")]
    pub async fn get_order_book(&self, pair: &str, depth: u32) -> Result<OrderBook, EngineError> {
        if let Some(book) = self.order_book_cache.get(&pair.to_string(), ORDER_BOOK_TTL) {
            return Ok(book);
        }

        let query = format!("currency_pair={pair}&limit={depth}");
        let body = self.call("GET", "/spot/order_book", &query, "", false).await?;
        let book: OrderBook = serde_json::from_value(body)
            .map_err(|e| EngineError::Unknown(format!("malformed order book response: {e}")))?;

        self.order_book_cache.set(pair.to_string(), book.clone());
        Ok(book)
    }

    /// Chooses, between the top two levels on the relevant side, the one
    /// with the smaller size — reduces price impact per §4.8.
    pub async fn best_book_price(&self, pair: &str, side: OrderSide) -> Result<Option<Decimal>, EngineError> {
        let book = self.get_order_book(pair, 5).await?;
        let levels = match side {
            OrderSide::Buy => &book.asks,
            OrderSide::Sell => &book.bids,
        };
        let top_two: Vec<&OrderBookLevel> = levels.iter().take(2).collect();
        let chosen = match top_two.as_slice() {
            [a, b] => if a.size <= b.size { a } else { b },
            [a] => a,
            _ => return Ok(None),
        };
        Ok(Some(chosen.price))
    }

    #[instrument(skip(self), name = "exchange::get_candles")]
    pub async fn get_candles(&self, pair: &str, interval: &str, limit: u32) -> Result<Vec<Ohlcv>, EngineError> {
        let cache_key = (pair.to_string(), interval.to_string(), limit);
        if let Some(candles) = self.candle_cache.get(&cache_key, CANDLE_TTL) {
            return Ok(candles);
        }

        let query = format!("currency_pair={pair}&interval={interval}&limit={limit}");
        let body = self.call("GET", "/spot/candlesticks", &query, "", false).await?;
        let raw = body
            .as_array()
            .ok_or_else(|| EngineError::Unknown("candlesticks response is not an array".into()))?;

        let mut candles = Vec::with_capacity(raw.len());
        for row in raw {
            let arr = row
                .as_array()
                .ok_or_else(|| EngineError::Unknown("candle row is not an array".into()))?;
            if arr.len() < 6 {
                warn!(len = arr.len(), "skipping malformed candle row");
                continue;
            }
            let s = |i: usize| arr[i].as_str().unwrap_or("0");
            candles.push(Ohlcv {
                timestamp: s(0).parse().unwrap_or(0),
                volume: s(1).parse().unwrap_or_default(),
                close: s(2).parse().unwrap_or_default(),
                high: s(3).parse().unwrap_or_default(),
                low: s(4).parse().unwrap_or_default(),
                open: s(5).parse().unwrap_or_default(),
            });
        }

        self.candle_cache.set(cache_key, candles.clone());
        Ok(candles)
    }

    #[instrument(skip(self), name = "exchange::get_currency_pair_info")]
    pub async fn get_currency_pair_info(&self, pair: &str) -> Result<CurrencyPairInfo, EngineError> {
        if let Some(info) = self.pair_info_cache.get(&pair.to_string(), PAIR_INFO_TTL) {
            return Ok(info);
        }

        let body = self.call("GET", &format!("/spot/currency_pairs/{pair}"), "", "", false).await?;
        let raw: RawCurrencyPair = serde_json::from_value(body)
            .map_err(|e| EngineError::Unknown(format!("malformed currency pair response: {e}")))?;

        let min_notional = raw
            .min_quote_amount
            .and_then(|s| s.parse::<Decimal>().ok())
            .unwrap_or(Decimal::new(5, 0));

        let info = CurrencyPairInfo {
            min_notional,
            amount_precision: raw.amount_precision.unwrap_or(8),
            price_precision: raw.precision.unwrap_or(8),
        };

        self.pair_info_cache.set(pair.to_string(), info);
        Ok(info)
    }

    #[instrument(skip(self), name = "exchange::get_fee_rates")]
    pub async fn get_fee_rates(&self) -> Result<FeeRates, EngineError> {
        if let Some(rates) = self.fee_rates_cache.get(&(), FEE_RATES_TTL) {
            return Ok(rates);
        }

        let body = self.call("GET", "/wallet/fee", "", "", true).await?;
        let raw: RawFeeRates = serde_json::from_value(body)
            .map_err(|e| EngineError::Unknown(format!("malformed fee rates response: {e}")))?;

        let rates = FeeRates {
            maker: raw.maker_fee.and_then(|s| s.parse().ok()).unwrap_or(Decimal::new(2, 3)),
            taker: raw.taker_fee.and_then(|s| s.parse().ok()).unwrap_or(Decimal::new(2, 3)),
            gt_discount_enabled: raw.gt_discount.unwrap_or(false),
        };

        self.fee_rates_cache.set((), rates);
        Ok(rates)
    }

    /// If the account has the exchange-token fee discount enabled *and* a
    /// sufficient token balance to cover the estimated fee, returns the
    /// discounted rate; otherwise the normal rate. The discount factor
    /// (implementer choice, undocumented upstream) is fixed at 20% off.
    /// Thin wrapper over [`Self::effective_fee_rate_with_discount_flag`] for
    /// call sites that don't need to know whether GT was actually used.
    #[instrument(skip(self), name = "exchange::effective_fee_rate")]
    pub async fn effective_fee_rate(&self, order_type: OrderType, notional: Decimal) -> Result<Decimal, EngineError> {
        self.effective_fee_rate_with_discount_flag(order_type, notional).await.map(|(rate, _)| rate)
    }

    /// Same as [`Self::effective_fee_rate`] but also reports whether the GT
    /// discount was actually applied, for `gtUsed` in the trade audit log
    /// (SPEC_FULL.md's audit-row schema).
    #[instrument(skip(self), name = "exchange::effective_fee_rate_with_discount_flag")]
    pub async fn effective_fee_rate_with_discount_flag(
        &self,
        order_type: OrderType,
        notional: Decimal,
    ) -> Result<(Decimal, bool), EngineError> {
        let rates = self.get_fee_rates().await?;
        let base = match order_type {
            OrderType::Limit => rates.maker,
            OrderType::Market => rates.taker,
        };

        if !rates.gt_discount_enabled {
            return Ok((base, false));
        }

        let discounted = base * Decimal::new(8, 1); // 0.8
        let gt_price = self.get_ticker("GT_USDT").await?.unwrap_or(Decimal::ZERO);
        if gt_price <= Decimal::ZERO {
            return Ok((base, false));
        }
        let estimated_fee_quote = notional * discounted;
        let estimated_fee_gt = estimated_fee_quote / gt_price;
        let gt_balance = self.get_balance("GT").await.unwrap_or(Decimal::ZERO);

        if gt_balance >= estimated_fee_gt {
            Ok((discounted, true))
        } else {
            Ok((base, false))
        }
    }

    // -------------------------------------------------------------------------
    // Account / orders (signed)
    // -------------------------------------------------------------------------

    #[instrument(skip(self), name = "exchange::get_balance")]
    pub async fn get_balance(&self, asset: &str) -> Result<Decimal, EngineError> {
        if let Some(total) = self.balance_cache.get(&asset.to_string(), BALANCE_TTL) {
            return Ok(total);
        }

        let query = format!("currency={asset}");
        let body = self.call("GET", "/spot/accounts", &query, "", true).await?;
        let rows: Vec<RawBalance> = serde_json::from_value(body)
            .map_err(|e| EngineError::Unknown(format!("malformed accounts response: {e}")))?;

        let total = rows
            .into_iter()
            .find(|b| b.currency == asset)
            .map(|b| {
                let available: Decimal = b.available.parse().unwrap_or_default();
                let locked: Decimal = b.locked.parse().unwrap_or_default();
                available + locked
            })
            .unwrap_or(Decimal::ZERO);

        self.balance_cache.set(asset.to_string(), total);
        Ok(total)
    }

    #[instrument(skip(self), name = "exchange::list_buy_fills")]
    pub async fn list_buy_fills(&self, pair: &str) -> Result<Vec<Fill>, EngineError> {
        if let Some(fills) = self.fills_cache.get(&pair.to_string(), BALANCE_TTL) {
            return Ok(fills);
        }

        let query = format!("currency_pair={pair}");
        let body = self.call("GET", "/spot/my_trades", &query, "", true).await?;
        let rows: Vec<RawTrade> = serde_json::from_value(body)
            .map_err(|e| EngineError::Unknown(format!("malformed my_trades response: {e}")))?;

        let fills: Vec<Fill> = rows
            .into_iter()
            .filter(|t| t.side == "buy")
            .filter_map(|t| {
                let price: Decimal = t.price.parse().ok()?;
                let qty: Decimal = t.amount.parse().ok()?;
                let fee: Decimal = t.fee.parse().ok()?;
                Some(Fill {
                    order_id: t.order_id,
                    price,
                    qty,
                    value: price * qty,
                    ts: t.create_time.parse().unwrap_or(0),
                    fee,
                    fee_currency: t.fee_currency,
                })
            })
            .collect();

        self.fills_cache.set(pair.to_string(), fills.clone());
        Ok(fills)
    }

    #[instrument(skip(self, price), name = "exchange::place_spot_order")]
    pub async fn place_spot_order(
        &self,
        pair: &str,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<PlaceOrderResponse, EngineError> {
        let info = self.get_currency_pair_info(pair).await?;
        let notional = qty * price;
        let floor = info.min_notional * MIN_NOTIONAL_SAFETY_MARGIN;
        if notional < floor {
            return Err(EngineError::MinOrderValue {
                value: notional.to_string(),
                minimum: floor.to_string(),
            });
        }

        let payload = serde_json::json!({
            "currency_pair": pair,
            "type": order_type.as_str(),
            "side": side.as_str(),
            "amount": qty.to_string(),
            "price": price.to_string(),
        })
        .to_string();

        let body = self.call("POST", "/spot/orders", "", &payload, true).await?;
        let raw: RawOrder = serde_json::from_value(body)
            .map_err(|e| EngineError::Unknown(format!("malformed order response: {e}")))?;

        self.invalidate_after_order(pair, side);

        Ok(PlaceOrderResponse {
            order_id: raw.id,
            status: raw.status,
            price: raw.price.parse().unwrap_or(price),
            amount: raw.amount.parse().unwrap_or(qty),
        })
    }

    #[instrument(skip(self), name = "exchange::get_order_status")]
    pub async fn get_order_status(&self, pair: &str, order_id: &str) -> Result<RawOrder, EngineError> {
        let query = format!("currency_pair={pair}");
        let body = self.call("GET", &format!("/spot/orders/{order_id}"), &query, "", true).await?;
        serde_json::from_value(body).map_err(|e| EngineError::Unknown(format!("malformed order status response: {e}")))
    }

    /// Order placement invalidates the affected asset's balance cache and
    /// the pair's fill-history cache (§4.8 "Cache coherence").
    fn invalidate_after_order(&self, pair: &str, side: OrderSide) {
        let (base, quote) = split_pair(pair);
        self.balance_cache.invalidate(&base);
        self.balance_cache.invalidate(&quote);
        if side == OrderSide::Buy {
            self.fills_cache.invalidate(&pair.to_string());
        }
        debug!(pair, ?side, "invalidated balance/fills caches after order placement");
    }
}

pub(crate) fn split_pair(pair: &str) -> (String, String) {
    match pair.split_once('_') {
        Some((base, quote)) => (base.to_string(), quote.to_string()),
        None => (pair.to_string(), "USDT".to_string()),
    }
}

/// HTTP status / body classification for this client's transport layer.
/// `error::EngineError::classify_http` handles rate-limit/server/timeout/
/// network; this extends it with the "structured error body" `Api` category
/// for any other 4xx that isn't one of those (§7 taxonomy).
fn classify_status(status: u16, body: &str) -> ErrorCategory {
    let base = EngineError::classify_http(Some(status), body);
    if base == ErrorCategory::Unknown && (400..500).contains(&status) {
        return ErrorCategory::Api;
    }
    base
}

/// Rebuilds a representative `EngineError` from a retry-exhausted
/// `(category, message)` pair. The category-specific metadata fields
/// (`retry_after`, `status`) are lost across the retry boundary by design —
/// RetryManager only threads the classification forward, not the original
/// typed error — so this fills them with the most conservative default.
fn reconstruct(category: ErrorCategory, message: String) -> EngineError {
    match category {
        ErrorCategory::Network => EngineError::Network(message),
        ErrorCategory::RateLimit => EngineError::RateLimit { retry_after: None },
        ErrorCategory::Server => EngineError::Server { status: 0, body: message },
        ErrorCategory::Timeout => EngineError::Timeout(message),
        ErrorCategory::Api => EngineError::Api { body: message },
        ErrorCategory::Validation => EngineError::Validation(message),
        ErrorCategory::InsufficientBalance => EngineError::InsufficientBalance {
            needed: String::new(),
            available: String::new(),
        },
        ErrorCategory::MinOrderValue => EngineError::MinOrderValue {
            value: String::new(),
            minimum: String::new(),
        },
        ErrorCategory::Unknown => EngineError::Unknown(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_status_maps_other_4xx_to_api() {
        assert_eq!(classify_status(400, "{\"label\":\"INVALID_PARAM\"}"), ErrorCategory::Api);
        assert_eq!(classify_status(429, ""), ErrorCategory::RateLimit);
        assert_eq!(classify_status(503, ""), ErrorCategory::Server);
    }

    #[test]
    fn split_pair_on_underscore() {
        assert_eq!(split_pair("BTC_USDT"), ("BTC".to_string(), "USDT".to_string()));
        assert_eq!(split_pair("WEIRD"), ("WEIRD".to_string(), "USDT".to_string()));
    }

    #[test]
    fn best_book_price_picks_smaller_of_top_two() {
        let book = OrderBook {
            bids: vec![
                OrderBookLevel { price: Decimal::new(100, 0), size: Decimal::new(5, 0) },
                OrderBookLevel { price: Decimal::new(99, 0), size: Decimal::new(1, 0) },
            ],
            asks: vec![],
        };
        let levels = &book.bids;
        let top_two: Vec<&OrderBookLevel> = levels.iter().take(2).collect();
        let chosen = match top_two.as_slice() {
            [a, b] => if a.size <= b.size { a } else { b },
            [a] => a,
            _ => panic!("expected levels"),
        };
        assert_eq!(chosen.price, Decimal::new(99, 0));
    }
}
