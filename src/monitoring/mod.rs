// =============================================================================
// MonitoringBus — throttled event fan-out with console/file alert handlers
// =============================================================================
//
// Ported from `advanced_monitoring_system.py`'s `MonitoringSystem`. Subscribers
// attach through `subscribe()` and receive events off a bounded
// `tokio::sync::broadcast` channel; a slow subscriber drops the oldest
// backlog rather than blocking publication (SPEC_FULL.md §9's re-architecture
// note on subscriber delivery).
// =============================================================================

pub mod event;
pub mod failure_detector;
pub mod log_analyzer;

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub use event::{EventKind, MonitoringEvent, Severity};
pub use failure_detector::{DetectedPattern, FailurePatternDetector};
pub use log_analyzer::{LogAnalysis, LogAnalyzer};

const DEFAULT_THROTTLE: Duration = Duration::from_secs(300);
const SUBSCRIBER_CAPACITY: usize = 256;

struct ThrottleState {
    last_emitted: HashMap<(EventKind, String), Instant>,
}

/// Central event bus the rest of the engine publishes to. One instance is
/// shared (behind an `Arc`) across the supervisor and every worker.
pub struct MonitoringBus {
    throttle_interval: Duration,
    throttle: Mutex<ThrottleState>,
    detector: FailurePatternDetector,
    alerts_file: Option<PathBuf>,
    sender: broadcast::Sender<MonitoringEvent>,
}

impl MonitoringBus {
    pub fn new(alerts_file: Option<PathBuf>) -> Self {
        Self::with_throttle(alerts_file, DEFAULT_THROTTLE)
    }

    pub fn with_throttle(alerts_file: Option<PathBuf>, throttle_interval: Duration) -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            throttle_interval,
            throttle: Mutex::new(ThrottleState {
                last_emitted: HashMap::new(),
            }),
            detector: FailurePatternDetector::default(),
            alerts_file,
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitoringEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event unless it is throttled. `Severity::Critical` events
    /// always publish regardless of the throttle window (SPEC_FULL.md §3).
    pub fn publish(&self, event: MonitoringEvent) {
        if event.severity != Severity::Critical && self.is_throttled(&event) {
            debug!(kind = ?event.kind, source = %event.source, "monitoring event throttled");
            return;
        }

        self.dispatch(&event);
        let _ = self.sender.send(event);
    }

    /// Records a trade/API outcome with the failure-pattern detector and
    /// publishes any newly crossed pattern as an `AnomalyDetected` event.
    pub fn record_outcome(&self, source: &str, kind: EventKind, success: bool, is_timeout: bool) {
        for pattern in self.detector.record(kind, success, is_timeout) {
            self.publish(MonitoringEvent::new(
                EventKind::AnomalyDetected,
                pattern.severity,
                source,
                pattern.description.clone(),
                serde_json::json!({ "pattern": pattern.name }),
            ));
        }
    }

    /// Runs one `LogAnalyzer` pass over `log_dir` and publishes any detected
    /// anomaly as an `AnomalyDetected`/`PerformanceDegradation` event (§4.7
    /// "Log analysis"). Intended to be driven by a periodic background task;
    /// see `spawn_log_analysis_loop`.
    pub fn run_log_analysis(&self, analyzer: &LogAnalyzer, source: &str, hours_back: u64, realized_profits: &[f64]) {
        let analysis = analyzer.analyze_recent(hours_back, realized_profits);
        for anomaly in &analysis.anomalies {
            let severity = match anomaly.severity {
                "critical" => Severity::Critical,
                "warning" => Severity::Warning,
                _ => Severity::Info,
            };
            let kind = if anomaly.kind == "performance_degradation" {
                EventKind::PerformanceDegradation
            } else {
                EventKind::AnomalyDetected
            };
            self.publish(MonitoringEvent::new(
                kind,
                severity,
                source,
                anomaly.description.clone(),
                serde_json::json!({ "pattern": anomaly.kind }),
            ));
        }
    }

    fn is_throttled(&self, event: &MonitoringEvent) -> bool {
        let key = event.throttle_key();
        let mut throttle = self.throttle.lock();
        let now = Instant::now();
        match throttle.last_emitted.get(&key) {
            Some(last) if now.duration_since(*last) < self.throttle_interval => true,
            _ => {
                throttle.last_emitted.insert(key, now);
                false
            }
        }
    }

    fn dispatch(&self, event: &MonitoringEvent) {
        match event.severity {
            Severity::Critical | Severity::Error => {
                error!(kind = ?event.kind, source = %event.source, "{}", event.message)
            }
            Severity::Warning => warn!(kind = ?event.kind, source = %event.source, "{}", event.message),
            Severity::Info => info!(kind = ?event.kind, source = %event.source, "{}", event.message),
        }

        if let Some(path) = &self.alerts_file {
            if let Err(e) = append_alert_line(path, event) {
                warn!(error = %e, "failed to append monitoring event to alerts file");
            }
        }
    }
}

fn append_alert_line(path: &PathBuf, event: &MonitoringEvent) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

pub fn default_alerts_path() -> PathBuf {
    PathBuf::from("trading_logs").join(format!("alerts-{}.ndjson", Utc::now().format("%Y%m%d")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_event(source: &str) -> MonitoringEvent {
        MonitoringEvent::new(
            EventKind::TradeSuccess,
            Severity::Info,
            source,
            "test event",
            serde_json::json!({}),
        )
    }

    #[test]
    fn throttles_repeated_events_from_same_source_within_window() {
        let bus = MonitoringBus::with_throttle(None, Duration::from_secs(600));
        let mut rx = bus.subscribe();
        bus.publish(info_event("BTC_USDT"));
        bus.publish(info_event("BTC_USDT"));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn critical_events_bypass_throttle() {
        let bus = MonitoringBus::with_throttle(None, Duration::from_secs(600));
        let mut rx = bus.subscribe();
        let critical = MonitoringEvent::new(
            EventKind::CircuitBreaker,
            Severity::Critical,
            "BTC_USDT",
            "tripped",
            serde_json::json!({}),
        );
        bus.publish(critical.clone());
        bus.publish(critical);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn different_sources_are_not_cross_throttled() {
        let bus = MonitoringBus::with_throttle(None, Duration::from_secs(600));
        let mut rx = bus.subscribe();
        bus.publish(info_event("BTC_USDT"));
        bus.publish(info_event("ETH_USDT"));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn run_log_analysis_publishes_performance_degradation_event() {
        let bus = MonitoringBus::with_throttle(None, Duration::from_millis(1));
        let mut rx = bus.subscribe();
        let analyzer = LogAnalyzer::new("/tmp/does-not-exist-gatescalp-monitoring-test");
        let mut older = vec![1.0; 10];
        let mut recent = vec![0.1; 10];
        older.append(&mut recent);
        bus.run_log_analysis(&analyzer, "BTC_USDT", 1, &older);
        let mut saw_degradation = false;
        while let Ok(evt) = rx.try_recv() {
            if evt.kind == EventKind::PerformanceDegradation {
                saw_degradation = true;
            }
        }
        assert!(saw_degradation);
    }

    #[test]
    fn record_outcome_surfaces_detector_patterns_as_anomaly_events() {
        let bus = MonitoringBus::with_throttle(None, Duration::from_millis(1));
        let mut rx = bus.subscribe();
        for _ in 0..9 {
            bus.record_outcome("BTC_USDT", EventKind::TradeSuccess, true, false);
        }
        for _ in 0..5 {
            bus.record_outcome("BTC_USDT", EventKind::TradeFailure, false, false);
        }
        let mut saw_anomaly = false;
        while let Ok(evt) = rx.try_recv() {
            if evt.kind == EventKind::AnomalyDetected {
                saw_anomaly = true;
            }
        }
        assert!(saw_anomaly);
    }
}
