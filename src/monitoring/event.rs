// =============================================================================
// MonitoringEvent — the immutable unit the bus moves around
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    TradeSuccess,
    TradeFailure,
    ApiError,
    CircuitBreaker,
    RateLimit,
    BalanceLow,
    PerformanceDegradation,
    AnomalyDetected,
}

/// Immutable monitoring event; SPEC_FULL.md §3 `{timestamp, kind, severity,
/// source, message, metadata}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub severity: Severity,
    pub source: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

impl MonitoringEvent {
    pub fn new(
        kind: EventKind,
        severity: Severity,
        source: impl Into<String>,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            severity,
            source: source.into(),
            message: message.into(),
            metadata,
        }
    }

    pub fn throttle_key(&self) -> (EventKind, String) {
        (self.kind, self.source.clone())
    }
}
