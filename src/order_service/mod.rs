// =============================================================================
// OrderService — orchestrates one order across four small collaborators
// =============================================================================
//
// Restructures the teacher's `execution.rs` (`ExecutionEngine`,
// `ExecutionResult` enum) into four explicit collaborator structs per §9's
// "collapse to small capability interfaces" note, instead of one monolithic
// engine method.
// =============================================================================

pub mod calculator;
pub mod executor;
pub mod logger;
pub mod validator;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::warn;

use crate::circuit_breaker::{CircuitBreaker, FailureKind};
use crate::error::{EngineError, ErrorCategory};
use crate::exchange::types::{OrderSide, OrderType, PlaceOrderResponse};
use crate::exchange::ExchangeClient;
use crate::monitoring::MonitoringBus;

pub use calculator::{Calculator, CalculatedOrder};
pub use executor::Executor;
pub use logger::{Logger, OrderRecord};
pub use validator::Validator;

pub struct OrderRequest {
    pub pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quote_amount: Decimal,
    pub price: Decimal,
    pub session_id: String,
    pub operation_type: String,
    pub percentage: Decimal,
    pub price_source: String,
}

pub struct OrderService {
    exchange: Arc<ExchangeClient>,
    breaker: Arc<CircuitBreaker>,
    validator: Validator,
    calculator: Calculator,
    executor: Executor,
    logger: Logger,
}

impl OrderService {
    pub fn new(
        exchange: Arc<ExchangeClient>,
        monitoring: Arc<MonitoringBus>,
        breaker: Arc<CircuitBreaker>,
        log_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            executor: Executor::new(exchange.clone()),
            logger: Logger::new(log_dir, monitoring),
            exchange,
            breaker,
            validator: Validator::new(),
            calculator: Calculator::new(),
        }
    }

    pub async fn place(&self, request: OrderRequest) -> Result<(PlaceOrderResponse, OrderRecord), EngineError> {
        let start = Instant::now();
        let quote_asset = "USDT";

        let balance_before = self.exchange.get_balance(quote_asset).await?;

        let pair_info = match self.exchange.get_currency_pair_info(&request.pair).await {
            Ok(info) => info,
            Err(e) => {
                self.handle_failure(&request, &e, balance_before, balance_before, start);
                return Err(e);
            }
        };

        if !self.breaker.can_proceed() {
            let err = EngineError::Api { body: "circuit breaker open for pair".into() };
            self.handle_failure(&request, &err, balance_before, balance_before, start);
            return Err(err);
        }

        if let Err(e) = self.validator.validate(request.quote_amount, balance_before, request.price, &pair_info) {
            self.handle_failure(&request, &e, balance_before, balance_before, start);
            return Err(e);
        }

        let (fee_rate, gt_used) = self
            .exchange
            .effective_fee_rate_with_discount_flag(request.order_type, request.quote_amount)
            .await
            .unwrap_or((Decimal::new(2, 3), false));

        let calc = self
            .calculator
            .calculate(request.quote_amount, request.price, &pair_info, fee_rate, gt_used, request.order_type);

        match self.executor.execute(&request.pair, request.side, calc.qty, calc.price, request.order_type).await {
            Ok(response) => {
                self.breaker.record_success();
                let balance_after = self.exchange.get_balance(quote_asset).await.unwrap_or(balance_before);
                let record = self.build_record(&request, &calc, &response, "success", balance_before, balance_after, start, "");
                self.logger.record(&record);
                Ok((response, record))
            }
            Err(e) => {
                self.handle_failure(&request, &e, balance_before, balance_before, start);
                Err(e)
            }
        }
    }

    fn handle_failure(
        &self,
        request: &OrderRequest,
        error: &EngineError,
        balance_before: Decimal,
        balance_after: Decimal,
        start: Instant,
    ) {
        let category = error.category();
        if category != ErrorCategory::Validation {
            self.breaker.record_failure(failure_kind(category));
        }

        warn!(pair = %request.pair, error = %error, "order placement failed");

        let empty = PlaceOrderResponse {
            order_id: String::new(),
            status: category.to_string(),
            price: request.price,
            amount: Decimal::ZERO,
        };
        let calc = CalculatedOrder {
            qty: Decimal::ZERO,
            price: request.price,
            gross_value: Decimal::ZERO,
            fee_rate: Decimal::ZERO,
            fee_estimated: Decimal::ZERO,
            gt_used: false,
        };
        let record = self.build_record(
            request,
            &calc,
            &empty,
            "failed",
            balance_before,
            balance_after,
            start,
            &error.to_string(),
        );
        self.logger.record(&record);
    }

    fn build_record(
        &self,
        request: &OrderRequest,
        calc: &CalculatedOrder,
        response: &PlaceOrderResponse,
        status: &str,
        balance_before: Decimal,
        balance_after: Decimal,
        start: Instant,
        notes: &str,
    ) -> OrderRecord {
        OrderRecord {
            timestamp: Utc::now().to_rfc3339(),
            session_id: request.session_id.clone(),
            operation_type: request.operation_type.clone(),
            pair: request.pair.clone(),
            percentage: request.percentage.to_string(),
            qty: calc.qty.to_string(),
            price: calc.price.to_string(),
            gross_value: calc.gross_value.to_string(),
            order_id: response.order_id.clone(),
            status: status.to_string(),
            fee_estimated: calc.fee_estimated.to_string(),
            fee_rate: calc.fee_rate.to_string(),
            gt_used: calc.gt_used,
            balance_before: balance_before.to_string(),
            balance_after: balance_after.to_string(),
            price_source: request.price_source.clone(),
            exec_time_ms: start.elapsed().as_millis() as u64,
            user_action: "none".to_string(),
            notes: notes.to_string(),
        }
    }
}

/// Maps the error taxonomy onto the circuit breaker's coarser failure-kind
/// classification (§4.6/§4.10).
fn failure_kind(category: ErrorCategory) -> FailureKind {
    match category {
        ErrorCategory::Network | ErrorCategory::Server | ErrorCategory::Timeout => FailureKind::Network,
        ErrorCategory::RateLimit => FailureKind::ApiLimit,
        ErrorCategory::InsufficientBalance | ErrorCategory::MinOrderValue => FailureKind::InsufficientBalance,
        ErrorCategory::Validation => FailureKind::Validation,
        ErrorCategory::Api | ErrorCategory::Unknown => FailureKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_maps_insufficient_categories_together() {
        assert_eq!(failure_kind(ErrorCategory::InsufficientBalance), FailureKind::InsufficientBalance);
        assert_eq!(failure_kind(ErrorCategory::MinOrderValue), FailureKind::InsufficientBalance);
        assert_eq!(failure_kind(ErrorCategory::RateLimit), FailureKind::ApiLimit);
    }
}
