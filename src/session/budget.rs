// =============================================================================
// BudgetCoordinator — total-quote query, atomic allocate/deallocate
// =============================================================================
//
// Ported verbatim-algorithm from `session_manager.py`'s `BudgetCoordinator`
// class: the `available > 10` absolute floor and the `0.9 * available`
// partial-grant formula are the source's exact constants (SPEC_FULL.md §4.12).
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use tracing::info;

use crate::exchange::ExchangeClient;
use crate::session::shared_state::{BotLifecycleStatus, SharedState};
use crate::smart_cache::SmartCache;

/// Absolute floor below which no partial grant is made (§4.12).
const ABSOLUTE_FLOOR: Decimal = Decimal::from_parts(10, 0, 0, false, 0);
/// Fraction of `available` granted when a request exceeds it but clears the
/// absolute floor.
const PARTIAL_GRANT_FRACTION: Decimal = Decimal::from_parts(9, 0, 0, false, 1); // 0.9

const TOTAL_QUOTE_TTL: Duration = Duration::from_secs(5);

pub struct AllocationResult {
    pub granted: Decimal,
    pub ok: bool,
}

pub struct BudgetCoordinator {
    exchange: Arc<ExchangeClient>,
    shared_state: Arc<SharedState>,
    total_cache: SmartCache<(), Decimal>,
}

impl BudgetCoordinator {
    pub fn new(exchange: Arc<ExchangeClient>, shared_state: Arc<SharedState>) -> Self {
        Self {
            exchange,
            shared_state,
            total_cache: SmartCache::new(),
        }
    }

    /// Queries the exchange for the quote-currency (USDT) balance, cached
    /// for `TOTAL_QUOTE_TTL` to avoid hammering the balance endpoint on
    /// every allocation decision.
    pub async fn total_quote(&self) -> Result<Decimal> {
        if let Some(total) = self.total_cache.get(&(), TOTAL_QUOTE_TTL) {
            return Ok(total);
        }
        let total = self.exchange.get_balance("USDT").await?;
        self.total_cache.set((), total);
        Ok(total)
    }

    /// Recomputes `allocated = Σ active bots' allocatedBudget`, `available =
    /// max(0, total - allocated)`, and persists both to SharedState.
    pub async fn update(&self) -> Result<()> {
        let total = self.total_quote().await?;
        self.shared_state
            .update(|doc| {
                let allocated: Decimal = doc
                    .bots
                    .values()
                    .filter(|b| matches!(b.status, BotLifecycleStatus::Starting | BotLifecycleStatus::Running))
                    .map(|b| b.allocated_budget)
                    .sum();
                doc.global_budget.total_quote = total;
                doc.global_budget.allocated_quote = allocated;
                doc.global_budget.available_quote = (total - allocated).max(Decimal::ZERO);
            })
            .await?;
        Ok(())
    }

    /// Grants `requested` in full if affordable; otherwise grants a partial
    /// `0.9 * available` if `available` clears the absolute floor; otherwise
    /// denies with `granted = 0` (§4.12).
    pub async fn allocate(&self, pair: &str, requested: Decimal) -> Result<AllocationResult> {
        self.update().await?;
        let doc = self.shared_state.read().await?;
        let available = doc.global_budget.available_quote;

        let granted = if requested <= available {
            requested
        } else if available > ABSOLUTE_FLOOR {
            available * PARTIAL_GRANT_FRACTION
        } else {
            Decimal::ZERO
        };

        if granted > Decimal::ZERO {
            self.shared_state
                .update(|doc| {
                    if let Some(bot) = doc.bots.get_mut(pair) {
                        bot.allocated_budget = granted;
                    }
                    let allocated: Decimal = doc
                        .bots
                        .values()
                        .filter(|b| matches!(b.status, BotLifecycleStatus::Starting | BotLifecycleStatus::Running))
                        .map(|b| b.allocated_budget)
                        .sum();
                    doc.global_budget.allocated_quote = allocated;
                    doc.global_budget.available_quote = (doc.global_budget.total_quote - allocated).max(Decimal::ZERO);
                })
                .await?;
        }

        info!(pair, %requested, %granted, "budget allocation decision");
        Ok(AllocationResult { granted, ok: granted > Decimal::ZERO })
    }

    /// Zeroes the bot's allocation and recomputes the global budget.
    pub async fn deallocate(&self, pair: &str) -> Result<()> {
        self.shared_state
            .update(|doc| {
                if let Some(bot) = doc.bots.get_mut(pair) {
                    bot.allocated_budget = Decimal::ZERO;
                }
            })
            .await?;
        self.update().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_spec() {
        assert_eq!(ABSOLUTE_FLOOR, Decimal::new(10, 0));
        assert_eq!(PARTIAL_GRANT_FRACTION, Decimal::new(9, 1));
    }
}
