// =============================================================================
// TradingEngine — the per-pair waitingToBuy / positionOpen / waitingForSell
// state machine (SPEC_FULL.md §4.11, "the heart")
// =============================================================================
//
// Grounded on the teacher's `position_engine.rs` (RwLock<Position> idiom) and
// `strategy.rs` (indicator-pipeline-then-gate-then-envelope shape, though the
// indicator basis is replaced per spec). Orchestrates L1 (SafeSleepManager),
// L6 (CircuitBreaker, owned by OrderService), L8 (ExchangeClient), L9
// (WalletView), L10 (OrderService) and its own `dca`/`entry`/`safety`/`state`
// submodules.
// =============================================================================

pub mod dca;
pub mod entry;
pub mod safety;
pub mod state;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::exchange::types::{OrderSide, OrderType};
use crate::exchange::ExchangeClient;
use crate::monitoring::{EventKind, MonitoringBus, MonitoringEvent, Severity};
use crate::order_service::{OrderRequest, OrderService};
use crate::safe_sleep::{SafeSleepManager, SleepContext};
use crate::wallet::WalletView;

pub use dca::{DcaConfig, DcaLadder};
pub use safety::{SafetyConfig, SafetySystem};
pub use state::{EngineState, Position};

/// Defends against any upstream bug spinning the loop forever; roughly a
/// full trading day at a realistic 2s-per-iteration pace (§4.11).
const MAX_LOOP_ITERATIONS: u64 = 12_000;

/// Below this base-asset quantity a position is considered fully closed.
/// The source leaves the exact magnitude unspecified beyond "dust"; this
/// crate fixes it at 1e-8 (documented in DESIGN.md).
const DUST_QTY: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// Aggressive-limit offset through the best opposing quote (glossary).
const AGGRESSIVE_LIMIT_OFFSET: Decimal = Decimal::from_parts(2, 0, 0, false, 3); // 0.002
const STOP_LOSS_OFFSET: Decimal = Decimal::from_parts(5, 0, 0, false, 3); // 0.005
const TIMEOUT_SELL_OFFSET: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001
const MIN_NOTIONAL_MARGIN: Decimal = Decimal::from_parts(115, 0, 0, false, 2); // 1.15

const BUY_FILL_POLL_INTERVAL_SECS: f64 = 0.2;
const BUY_FILL_MAX_POLLS: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineExitReason {
    StopRequested,
    Shutdown,
    SafetyDenied,
    LoopCapExceeded,
    SleepBudgetExhausted,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pair: String,
    pub session_id: String,
    pub target_profit_pct: Decimal,
    pub position_timeout_secs: u64,
    pub dca_config: DcaConfig,
    pub budget_per_trade: Decimal,
    pub max_trade_amount: Decimal,
    pub exit_fee_rate: Decimal,
    pub trading_cycle_interval_secs: f64,
    pub safety: SafetyConfig,
}

/// Cross-process status snapshot, §3 "Bot status".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatusSnapshot {
    pub pair: String,
    pub state: EngineState,
    pub allocated_budget: Decimal,
    pub current_position_qty: Option<Decimal>,
    pub current_position_entry: Option<Decimal>,
    pub trades_today: u32,
    pub pnl_percent: Decimal,
    pub last_action: Option<String>,
    pub last_action_at: Option<DateTime<Utc>>,
    pub errors_count: u32,
}

pub struct TradingEngine {
    config: EngineConfig,
    exchange: Arc<ExchangeClient>,
    wallet: Arc<WalletView>,
    monitoring: Arc<MonitoringBus>,
    order_service: OrderService,
    sleeper: Arc<SafeSleepManager>,
    safety: SafetySystem,

    state: RwLock<EngineState>,
    position: RwLock<Option<Position>>,
    trades_today: AtomicU32,
    errors_count: AtomicU32,
    last_action: RwLock<Option<String>>,
    last_action_at: RwLock<Option<DateTime<Utc>>>,
    stop_requested: Arc<AtomicBool>,
}

impl TradingEngine {
    pub fn new(
        config: EngineConfig,
        exchange: Arc<ExchangeClient>,
        monitoring: Arc<MonitoringBus>,
        sleeper: Arc<SafeSleepManager>,
        breaker: Arc<crate::circuit_breaker::CircuitBreaker>,
        log_dir: impl Into<std::path::PathBuf>,
        stop_requested: Arc<AtomicBool>,
    ) -> Self {
        let wallet = Arc::new(WalletView::new(exchange.clone(), monitoring.clone()));
        let order_service = OrderService::new(exchange.clone(), monitoring.clone(), breaker, log_dir);
        let safety = SafetySystem::new(config.safety);

        Self {
            config,
            exchange,
            wallet,
            monitoring,
            order_service,
            sleeper,
            safety,
            state: RwLock::new(EngineState::WaitingToBuy),
            position: RwLock::new(None),
            trades_today: AtomicU32::new(0),
            errors_count: AtomicU32::new(0),
            last_action: RwLock::new(None),
            last_action_at: RwLock::new(None),
            stop_requested,
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn snapshot(&self) -> BotStatusSnapshot {
        let position = self.position.read();
        let pnl_percent = match &*position {
            Some(p) => match self.exchange.peek_ticker(&self.config.pair) {
                Some(price) => p.pnl_pct(price),
                // no fresh tick cached yet: best-effort zero rather than a
                // stale or fabricated price.
                None => Decimal::ZERO,
            },
            None => Decimal::ZERO,
        };
        BotStatusSnapshot {
            pair: self.config.pair.clone(),
            state: self.state(),
            allocated_budget: self.config.budget_per_trade,
            current_position_qty: position.as_ref().map(|p| p.qty),
            current_position_entry: position.as_ref().map(|p| p.effective_entry()),
            trades_today: self.trades_today.load(Ordering::Relaxed),
            pnl_percent,
            last_action: self.last_action.read().clone(),
            last_action_at: *self.last_action_at.read(),
            errors_count: self.errors_count.load(Ordering::Relaxed),
        }
    }

    fn record_action(&self, action: impl Into<String>) {
        *self.last_action.write() = Some(action.into());
        *self.last_action_at.write() = Some(Utc::now());
    }

    fn base_asset(&self) -> String {
        self.config.pair.split('_').next().unwrap_or(&self.config.pair).to_string()
    }

    /// Runs the state machine to completion. Returns the reason the loop
    /// stopped; callers (the worker process) use this to decide the process
    /// exit code (§6 "Command-line surface for workers").
    #[instrument(skip(self), fields(pair = %self.config.pair))]
    pub async fn run(&self) -> EngineExitReason {
        let mut iterations: u64 = 0;

        loop {
            if self.stop_requested.load(Ordering::Relaxed) {
                info!("stop requested, exiting trading loop");
                return EngineExitReason::StopRequested;
            }

            iterations += 1;
            if iterations > MAX_LOOP_ITERATIONS {
                warn!(iterations, "loop iteration cap exceeded, hard stop");
                return EngineExitReason::LoopCapExceeded;
            }

            if !self.safety.can_trade() {
                warn!(reason = ?self.safety.denial_reason(), "safety system denied further trading");
                return EngineExitReason::SafetyDenied;
            }

            if let Err(e) = self.tick().await {
                self.errors_count.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "tick failed");
                self.monitoring.publish(MonitoringEvent::new(
                    EventKind::ApiError,
                    Severity::Warning,
                    &self.config.pair,
                    e.to_string(),
                    serde_json::json!({ "category": e.category().to_string() }),
                ));
            }

            let kept_going = self
                .sleeper
                .safe_sleep(self.config.trading_cycle_interval_secs, SleepContext::TradingCycle, true)
                .await;
            if !kept_going {
                warn!("sleep budget exhausted, hard stop");
                return EngineExitReason::SleepBudgetExhausted;
            }
        }
    }

    async fn tick(&self) -> Result<(), crate::error::EngineError> {
        match self.state() {
            EngineState::WaitingToBuy => self.tick_waiting_to_buy().await,
            EngineState::PositionOpen => self.tick_position_open().await,
            EngineState::WaitingForSell => self.tick_waiting_for_sell().await,
        }
    }

    // -------------------------------------------------------------------------
    // waitingToBuy
    // -------------------------------------------------------------------------

    async fn tick_waiting_to_buy(&self) -> Result<(), crate::error::EngineError> {
        if self.wallet.is_blocked(&self.config.pair) {
            return Ok(());
        }

        let base = self.base_asset();
        let base_balance = self.wallet.available(&base).await?;

        if base_balance > DUST_QTY {
            // Virtual-entry path (§4.11, §9 open question resolved as
            // "restart-safe, simple": adopt at current market price).
            let price = match self.exchange.get_ticker(&self.config.pair).await? {
                Some(p) => p,
                None => return Ok(()),
            };
            let position = Position::new_virtual(price, base_balance, DcaLadder::new(self.config.dca_config));
            info!(pair = %self.config.pair, price = %price, qty = %base_balance, "adopting existing balance as virtual entry");
            self.record_action("virtual_entry");
            *self.position.write() = Some(position);
            *self.state.write() = EngineState::PositionOpen;
            return Ok(());
        }

        let candles = self.exchange.get_candles(&self.config.pair, "1m", 20).await?;
        let signal = entry::evaluate(&candles);
        if !signal.should_enter {
            return Ok(());
        }

        let min_notional = self
            .exchange
            .get_currency_pair_info(&self.config.pair)
            .await
            .map(|info| info.min_notional * MIN_NOTIONAL_MARGIN)
            .unwrap_or(Decimal::new(575, 2));

        let hour = Utc::now().hour();
        let capital = self.wallet.available("USDT").await?;
        let budget_cap = self.config.budget_per_trade.min(self.config.max_trade_amount);
        let requested = entry::position_size(&signal, capital, hour, min_notional, budget_cap);

        let granted = self.wallet.suggest_affordable(requested, &self.config.pair, min_notional).await?;
        if granted <= Decimal::ZERO {
            return Ok(());
        }

        let best_ask = match self.exchange.best_book_price(&self.config.pair, OrderSide::Buy).await? {
            Some(p) => p,
            None => return Ok(()),
        };
        let limit_price = (best_ask * (Decimal::ONE + AGGRESSIVE_LIMIT_OFFSET)).round_dp(8);

        let request = OrderRequest {
            pair: self.config.pair.clone(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quote_amount: granted,
            price: limit_price,
            session_id: self.config.session_id.clone(),
            operation_type: "entry".to_string(),
            percentage: Decimal::ZERO,
            price_source: "best_ask_aggressive".to_string(),
        };

        let (response, _record) = self.order_service.place(request).await?;
        self.record_action("buy_placed");

        let fill = self.poll_for_fill(&response.order_id).await?;
        match fill {
            Some((fill_price, fill_qty)) if fill_qty > Decimal::ZERO => {
                let position = Position::new_real(fill_price, fill_qty, DcaLadder::new(self.config.dca_config));
                info!(pair = %self.config.pair, price = %fill_price, qty = %fill_qty, "entry filled");
                self.monitoring.publish(MonitoringEvent::new(
                    EventKind::TradeSuccess,
                    Severity::Info,
                    &self.config.pair,
                    "entry order filled",
                    serde_json::json!({ "price": fill_price.to_string(), "qty": fill_qty.to_string() }),
                ));
                *self.position.write() = Some(position);
                *self.state.write() = EngineState::PositionOpen;
            }
            _ => {
                info!(pair = %self.config.pair, "entry order not filled within wait window");
            }
        }

        Ok(())
    }

    /// Polls `getOrderStatus` up to `BUY_FILL_MAX_POLLS` times, sleeping
    /// `BUY_FILL_POLL_INTERVAL_SECS` apart, waiting up to 5s total for a
    /// fill (§4.11 transition table).
    async fn poll_for_fill(&self, order_id: &str) -> Result<Option<(Decimal, Decimal)>, crate::error::EngineError> {
        for _ in 0..BUY_FILL_MAX_POLLS {
            let order = self.exchange.get_order_status(&self.config.pair, order_id).await?;
            let amount: Decimal = order.amount.parse().unwrap_or(Decimal::ZERO);
            let left: Decimal = order.left.parse().unwrap_or(amount);
            let filled_qty = (amount - left).max(Decimal::ZERO);
            if order.status == "closed" || filled_qty > Decimal::ZERO {
                let price: Decimal = order.price.parse().unwrap_or(Decimal::ZERO);
                let qty = if order.status == "closed" { amount } else { filled_qty };
                return Ok(Some((price, qty)));
            }
            let kept_going = self
                .sleeper
                .safe_sleep(BUY_FILL_POLL_INTERVAL_SECS, SleepContext::TradingCycle, false)
                .await;
            if !kept_going {
                break;
            }
        }
        Ok(None)
    }

    // -------------------------------------------------------------------------
    // positionOpen
    // -------------------------------------------------------------------------

    async fn tick_position_open(&self) -> Result<(), crate::error::EngineError> {
        let position = match self.position.read().clone() {
            Some(p) => p,
            None => {
                warn!(pair = %self.config.pair, "positionOpen with no position, reverting to waitingToBuy");
                *self.state.write() = EngineState::WaitingToBuy;
                return Ok(());
            }
        };

        let price = match self.exchange.get_ticker(&self.config.pair).await? {
            Some(p) => p,
            None => return Ok(()),
        };
        let pnl_pct = position.pnl_pct(price);

        let target_price = position.effective_entry() * (Decimal::ONE + self.config.target_profit_pct / Decimal::new(100, 0));
        if price >= target_price {
            return self.exit_position(position, "target_hit", false).await;
        }

        if position.dca.should_stop_loss(pnl_pct) {
            return self.exit_position(position, "stop_loss", true).await;
        }

        if position.dca.should_activate_level2(pnl_pct) {
            return self.apply_dca_fill(position, position.dca.level2.multiplier, true).await;
        }

        if position.dca.should_activate_level1(pnl_pct) {
            return self.apply_dca_fill(position, position.dca.level1.multiplier, false).await;
        }

        if self.config.position_timeout_secs > 0 {
            let age = (Utc::now() - position.opened_at).num_seconds().max(0) as u64;
            if age >= self.config.position_timeout_secs {
                return self.exit_position(position, "timeout", false).await;
            }
        }

        Ok(())
    }

    async fn apply_dca_fill(
        &self,
        position: Position,
        multiplier: Decimal,
        is_level2: bool,
    ) -> Result<(), crate::error::EngineError> {
        if self.wallet.is_blocked(&self.config.pair) {
            return Ok(());
        }

        let best_ask = match self.exchange.best_book_price(&self.config.pair, OrderSide::Buy).await? {
            Some(p) => p,
            None => return Ok(()),
        };
        let fill_price = (best_ask * (Decimal::ONE + AGGRESSIVE_LIMIT_OFFSET)).round_dp(8);

        // Cap at the per-trade budget ceiling and run the same affordability
        // check the initial entry uses — a DCA ladder must stay inside this
        // bot's allocated budget, not just whatever the exchange account
        // happens to hold (which may include quote currency allocated to a
        // different pair's bot by BudgetCoordinator).
        let requested = (self.config.budget_per_trade * multiplier).min(self.config.max_trade_amount);
        let min_notional = self
            .exchange
            .get_currency_pair_info(&self.config.pair)
            .await
            .map(|info| info.min_notional * MIN_NOTIONAL_MARGIN)
            .unwrap_or(Decimal::new(575, 2));
        let amount = self.wallet.suggest_affordable(requested, &self.config.pair, min_notional).await?;
        if amount <= Decimal::ZERO {
            info!(pair = %self.config.pair, "DCA fill skipped: insufficient affordable budget");
            return Ok(());
        }

        let request = OrderRequest {
            pair: self.config.pair.clone(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quote_amount: amount,
            price: fill_price,
            session_id: self.config.session_id.clone(),
            operation_type: if is_level2 { "dca_level2".to_string() } else { "dca_level1".to_string() },
            percentage: Decimal::ZERO,
            price_source: "best_ask_aggressive".to_string(),
        };

        let (response, _record) = self.order_service.place(request).await?;
        let fill = self.poll_for_fill(&response.order_id).await?;

        let Some((actual_price, actual_qty)) = fill else {
            info!(pair = %self.config.pair, "DCA order not filled within wait window");
            return Ok(());
        };

        let mut updated = position;
        updated.record_dca_fill(actual_price, actual_qty);
        if is_level2 {
            updated.dca.activate_level2();
        } else {
            updated.dca.activate_level1();
        }
        info!(
            pair = %self.config.pair,
            level = if is_level2 { 2 } else { 1 },
            new_vwap = %updated.vwap,
            "DCA fill applied"
        );
        self.record_action(if is_level2 { "dca_level2" } else { "dca_level1" });
        self.monitoring.publish(MonitoringEvent::new(
            EventKind::TradeSuccess,
            Severity::Info,
            &self.config.pair,
            "DCA fill applied",
            serde_json::json!({ "level": if is_level2 { 2 } else { 1 }, "vwap": updated.vwap.to_string() }),
        ));
        *self.position.write() = Some(updated);
        Ok(())
    }

    /// Places the full-position exit order and transitions to
    /// `waitingForSell`. `is_stop_loss` selects the `bestBid * 0.995` offset
    /// (with timeout exits using `price * 0.999` as a fallback when no book
    /// is available, per the transition table).
    async fn exit_position(
        &self,
        mut position: Position,
        reason: &str,
        is_stop_loss: bool,
    ) -> Result<(), crate::error::EngineError> {
        let best_bid = self.exchange.best_book_price(&self.config.pair, OrderSide::Sell).await?;
        let fallback_price = self.exchange.get_ticker(&self.config.pair).await?.unwrap_or(position.effective_entry());

        let sell_price = match (best_bid, is_stop_loss) {
            (Some(bid), true) => (bid * (Decimal::ONE - STOP_LOSS_OFFSET)).round_dp(8),
            (Some(bid), false) if reason == "timeout" => bid.round_dp(8),
            (Some(bid), false) => bid.round_dp(8),
            (None, _) if reason == "timeout" => (fallback_price * (Decimal::ONE - TIMEOUT_SELL_OFFSET)).round_dp(8),
            (None, _) => fallback_price.round_dp(8),
        };

        let request = OrderRequest {
            pair: self.config.pair.clone(),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            quote_amount: (position.qty * sell_price).round_dp(8),
            price: sell_price,
            session_id: self.config.session_id.clone(),
            operation_type: reason.to_string(),
            percentage: Decimal::new(100, 0),
            price_source: "best_bid".to_string(),
        };

        let (response, _record) = self.order_service.place(request).await?;
        info!(pair = %self.config.pair, reason, price = %sell_price, "exit order placed");
        self.record_action(format!("exit_{reason}"));
        position.sell_order_id = Some(response.order_id);
        position.missing_sell_polls = 0;
        *self.position.write() = Some(position);
        *self.state.write() = EngineState::WaitingForSell;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // waitingForSell
    // -------------------------------------------------------------------------

    async fn tick_waiting_for_sell(&self) -> Result<(), crate::error::EngineError> {
        let position = match self.position.read().clone() {
            Some(p) => p,
            None => {
                *self.state.write() = EngineState::WaitingToBuy;
                return Ok(());
            }
        };

        let base = self.base_asset();
        let base_balance = self.wallet.available(&base).await?;

        if base_balance <= DUST_QTY {
            self.complete_trade(&position).await?;
            return Ok(());
        }

        let Some(order_id) = position.sell_order_id.clone() else {
            // No order on record but still holding balance: fall back to
            // re-attempting the exit from positionOpen.
            *self.state.write() = EngineState::PositionOpen;
            return Ok(());
        };

        let order_is_open = match self.exchange.get_order_status(&self.config.pair, &order_id).await {
            Ok(order) => order.status == "open",
            Err(_) => false,
        };

        if order_is_open {
            if let Some(p) = self.position.write().as_mut() {
                p.missing_sell_polls = 0;
            }
            return Ok(());
        }

        // Two-consecutive-poll hysteresis for the settlement-latency race
        // (§9 open question, resolved here as advised).
        let reverted = {
            let mut guard = self.position.write();
            if let Some(p) = guard.as_mut() {
                p.missing_sell_polls += 1;
                if p.missing_sell_polls >= 2 {
                    p.sell_order_id = None;
                    p.missing_sell_polls = 0;
                    true
                } else {
                    false
                }
            } else {
                false
            }
        };
        if reverted {
            warn!(pair = %self.config.pair, "sell order no longer visible, reverting to positionOpen");
            *self.state.write() = EngineState::PositionOpen;
        }

        Ok(())
    }

    async fn complete_trade(&self, position: &Position) -> Result<(), crate::error::EngineError> {
        let sell_price = if let Some(order_id) = &position.sell_order_id {
            self.exchange
                .get_order_status(&self.config.pair, order_id)
                .await
                .ok()
                .and_then(|o| o.price.parse::<Decimal>().ok())
                .unwrap_or(position.effective_entry())
        } else {
            position.effective_entry()
        };

        let gross_sell_value = position.qty * sell_price;
        let exit_fee = gross_sell_value * self.config.exit_fee_rate;
        let realized_pnl = (sell_price - position.effective_entry()) * position.qty - exit_fee;

        self.safety.record_trade(realized_pnl);
        self.trades_today.fetch_add(1, Ordering::Relaxed);
        self.record_action("trade_complete");

        let kind = if realized_pnl >= Decimal::ZERO { EventKind::TradeSuccess } else { EventKind::TradeFailure };
        info!(pair = %self.config.pair, realized_pnl = %realized_pnl, "trade complete");
        self.monitoring.publish(MonitoringEvent::new(
            kind,
            Severity::Info,
            &self.config.pair,
            format!("trade complete, realized P&L {realized_pnl}"),
            serde_json::json!({ "realizedPnl": realized_pnl.to_string() }),
        ));

        *self.position.write() = None;
        *self.state.write() = EngineState::WaitingToBuy;
        Ok(())
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
    }

    /// Today's realized P&L history, oldest first — feeds the monitoring
    /// bus's periodic `LogAnalyzer` pass (§4.7).
    pub fn profit_history(&self) -> Vec<f64> {
        self.safety.trade_pnls_f64()
    }

    /// Shared handle to this engine's monitoring bus, for tasks (like the
    /// periodic log analyzer) that run alongside the trading loop rather
    /// than inside it.
    pub fn monitoring_handle(&self) -> Arc<MonitoringBus> {
        self.monitoring.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dust_threshold_is_tiny_but_nonzero() {
        assert!(DUST_QTY > Decimal::ZERO);
        assert!(DUST_QTY < Decimal::new(1, 4));
    }

    #[test]
    fn exit_reason_serializes_camel_case() {
        let json = serde_json::to_string(&EngineExitReason::SafetyDenied).unwrap();
        assert_eq!(json, "\"safetyDenied\"");
    }
}
