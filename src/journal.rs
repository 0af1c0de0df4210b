// =============================================================================
// Trade journal reader — aggregates the per-day NDJSON audit files the
// order_service logger writes (SPEC_FULL.md §6.1 "trade journal")
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::order_service::logger::OrderRecord;

/// Reads every `audit-*.ndjson` file in `log_dir`, oldest first. Parse
/// failures on an individual line are skipped rather than failing the whole
/// read, since a truncated last line from a crash mid-write is expected.
pub fn read_all(log_dir: impl AsRef<Path>) -> Result<Vec<OrderRecord>> {
    let log_dir = log_dir.as_ref();
    if !log_dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(log_dir)
        .with_context(|| format!("failed to list {}", log_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "ndjson").unwrap_or(false))
        .collect();
    files.sort();

    let mut records = Vec::new();
    for path in files {
        let content = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<OrderRecord>(line) {
                records.push(record);
            }
        }
    }
    Ok(records)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalStats {
    pub total_orders: usize,
    pub successful_orders: usize,
    pub failed_orders: usize,
    pub win_rate: f64,
    pub total_gross_value: Decimal,
    pub total_estimated_fees: Decimal,
}

/// Aggregates the records the REST layer just read. `win_rate` is simply
/// `successfulOrders / totalOrders`; this is an order-success rate, not a
/// per-trade P&L win rate (that lives on `SafetySystem`, per-process).
pub fn compute_stats(records: &[OrderRecord]) -> JournalStats {
    let total_orders = records.len();
    let successful_orders = records
        .iter()
        .filter(|r| r.status == "success" || r.status == "filled" || r.status == "closed")
        .count();
    let failed_orders = total_orders - successful_orders;
    let win_rate = if total_orders > 0 {
        successful_orders as f64 / total_orders as f64
    } else {
        0.0
    };
    let total_gross_value = records
        .iter()
        .filter_map(|r| r.gross_value.parse::<Decimal>().ok())
        .sum();
    let total_estimated_fees = records
        .iter()
        .filter_map(|r| r.fee_estimated.parse::<Decimal>().ok())
        .sum();

    JournalStats {
        total_orders,
        successful_orders,
        failed_orders,
        win_rate,
        total_gross_value,
        total_estimated_fees,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::MonitoringBus;
    use crate::order_service::logger::Logger;
    use std::sync::Arc;

    fn sample(status: &str, gross: &str) -> OrderRecord {
        OrderRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            session_id: "sess-1".into(),
            operation_type: "buy".into(),
            pair: "BTC_USDT".into(),
            percentage: "0".into(),
            qty: "0.0025".into(),
            price: "20000".into(),
            gross_value: gross.into(),
            order_id: "123".into(),
            status: status.to_string(),
            fee_estimated: "0.1".into(),
            fee_rate: "0.002".into(),
            gt_used: false,
            balance_before: "100".into(),
            balance_after: "50".into(),
            price_source: "bestAsk".into(),
            exec_time_ms: 42,
            user_action: "none".into(),
            notes: String::new(),
        }
    }

    #[test]
    fn compute_stats_counts_success_and_failure() {
        let records = vec![sample("success", "50"), sample("failed", "50"), sample("success", "50")];
        let stats = compute_stats(&records);
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.successful_orders, 2);
        assert_eq!(stats.failed_orders, 1);
        assert!((stats.win_rate - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn compute_stats_on_empty_set_has_zero_win_rate() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.total_orders, 0);
        assert_eq!(stats.win_rate, 0.0);
    }

    #[test]
    fn read_all_round_trips_logger_output() {
        let dir = std::env::temp_dir().join(format!("gatescalp-journal-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let monitoring = Arc::new(MonitoringBus::new(None));
        let logger = Logger::new(&dir, monitoring);
        logger.record(&sample("success", "50"));
        logger.record(&sample("failed", "50"));

        let records = read_all(&dir).unwrap();
        assert_eq!(records.len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
