// =============================================================================
// Logger — per-day CSV + NDJSON trade audit log, plus a monitoring event
// =============================================================================
//
// Row shape from SPEC_FULL.md §3.1/§6: one row per order lifecycle step.
// CSV and NDJSON are both written (§6 "Persisted state files") since external
// tooling may prefer either; no example repo in this lineage writes CSV, so
// the minimal-surface `csv` crate was added for this one format need (see
// DESIGN.md's L10 entry).
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::monitoring::{EventKind, MonitoringBus, MonitoringEvent, Severity};

#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    pub timestamp: String,
    pub session_id: String,
    pub operation_type: String,
    pub pair: String,
    pub percentage: String,
    pub qty: String,
    pub price: String,
    pub gross_value: String,
    pub order_id: String,
    pub status: String,
    pub fee_estimated: String,
    pub fee_rate: String,
    pub gt_used: bool,
    pub balance_before: String,
    pub balance_after: String,
    pub price_source: String,
    pub exec_time_ms: u64,
    pub user_action: String,
    pub notes: String,
}

pub struct Logger {
    log_dir: PathBuf,
    monitoring: Arc<MonitoringBus>,
}

impl Logger {
    pub fn new(log_dir: impl Into<PathBuf>, monitoring: Arc<MonitoringBus>) -> Self {
        Self {
            log_dir: log_dir.into(),
            monitoring,
        }
    }

    fn day_stem(&self) -> String {
        Utc::now().format("%Y%m%d").to_string()
    }

    pub fn record(&self, record: &OrderRecord) {
        if let Err(e) = self.append_csv(record) {
            warn!(error = %e, "failed to append order record to csv audit log");
        }
        if let Err(e) = self.append_ndjson(record) {
            warn!(error = %e, "failed to append order record to ndjson audit log");
        }

        let success = record.status == "success" || record.status == "filled";
        self.monitoring.publish(MonitoringEvent::new(
            if success { EventKind::TradeSuccess } else { EventKind::TradeFailure },
            if success { Severity::Info } else { Severity::Warning },
            record.pair.clone(),
            format!(
                "{} {} status={}",
                record.operation_type, record.pair, record.status
            ),
            serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
        ));
    }

    fn append_csv(&self, record: &OrderRecord) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;
        let path = self.log_dir.join(format!("audit-{}.csv", self.day_stem()));
        let write_header = !path.exists();

        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if write_header {
            writer.write_record(CSV_HEADER)?;
        }
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    fn append_ndjson(&self, record: &OrderRecord) -> std::io::Result<()> {
        use std::io::Write;
        std::fs::create_dir_all(&self.log_dir)?;
        let path = self.log_dir.join(format!("audit-{}.ndjson", self.day_stem()));
        let line = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")
    }
}

const CSV_HEADER: &[&str] = &[
    "timestamp",
    "session_id",
    "operation_type",
    "pair",
    "percentage",
    "qty",
    "price",
    "gross_value",
    "order_id",
    "status",
    "fee_estimated",
    "fee_rate",
    "gt_used",
    "balance_before",
    "balance_after",
    "price_source",
    "exec_time_ms",
    "user_action",
    "notes",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(status: &str) -> OrderRecord {
        OrderRecord {
            timestamp: Utc::now().to_rfc3339(),
            session_id: "sess-1".into(),
            operation_type: "buy".into(),
            pair: "BTC_USDT".into(),
            percentage: "0".into(),
            qty: "0.0025".into(),
            price: "20000".into(),
            gross_value: "50".into(),
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
    fn writes_csv_and_ndjson_without_error() {
        let dir = std::env::temp_dir().join(format!("gatescalp-audit-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let monitoring = Arc::new(MonitoringBus::new(None));
        let logger = Logger::new(&dir, monitoring);
        logger.record(&sample_record("success"));
        logger.record(&sample_record("failed"));

        let csv_path = dir.join(format!("audit-{}.csv", Utc::now().format("%Y%m%d")));
        let ndjson_path = dir.join(format!("audit-{}.ndjson", Utc::now().format("%Y%m%d")));
        assert!(csv_path.exists());
        assert!(ndjson_path.exists());

        let ndjson_contents = std::fs::read_to_string(&ndjson_path).unwrap();
        assert_eq!(ndjson_contents.lines().count(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
