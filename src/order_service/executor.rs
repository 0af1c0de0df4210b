// =============================================================================
// Executor — submits an order to ExchangeClient and interprets the response
// =============================================================================

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::exchange::types::{OrderSide, OrderType, PlaceOrderResponse};
use crate::exchange::ExchangeClient;

pub struct Executor {
    exchange: Arc<ExchangeClient>,
}

impl Executor {
    pub fn new(exchange: Arc<ExchangeClient>) -> Self {
        Self { exchange }
    }

    pub async fn execute(
        &self,
        pair: &str,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<PlaceOrderResponse, EngineError> {
        self.exchange.place_spot_order(pair, side, qty, price, order_type).await
    }
}
