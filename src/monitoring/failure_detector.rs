// =============================================================================
// FailurePatternDetector — bounded ring of recent outcomes, early warning
// =============================================================================
//
// Ported from `advanced_monitoring_system.py`'s `FailurePatternDetector`: a
// fixed-size ring of the last N outcomes, scanned for consecutive-failure
// runs, elevated failure ratios, and API-timeout clustering.
// =============================================================================

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::event::{EventKind, Severity};

#[derive(Debug, Clone)]
struct Outcome {
    kind: EventKind,
    success: bool,
    is_timeout: bool,
}

#[derive(Debug, Clone)]
pub struct DetectedPattern {
    pub name: &'static str,
    pub severity: Severity,
    pub description: String,
}

pub struct FailurePatternDetector {
    ring: Mutex<VecDeque<Outcome>>,
    window_size: usize,
}

impl Default for FailurePatternDetector {
    fn default() -> Self {
        Self::new(100)
    }
}

impl FailurePatternDetector {
    pub fn new(window_size: usize) -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(window_size)),
            window_size,
        }
    }

    /// Records one outcome and returns any patterns crossed by this event.
    pub fn record(&self, kind: EventKind, success: bool, is_timeout: bool) -> Vec<DetectedPattern> {
        let mut ring = self.ring.lock();
        if ring.len() == self.window_size {
            ring.pop_front();
        }
        ring.push_back(Outcome {
            kind,
            success,
            is_timeout,
        });

        if ring.len() < 10 {
            return Vec::new();
        }

        let recent: Vec<&Outcome> = ring.iter().rev().take(20).collect();
        let mut patterns = Vec::new();

        let consecutive = recent.iter().take_while(|o| !o.success).count();
        if consecutive >= 5 {
            patterns.push(DetectedPattern {
                name: "consecutive_failures",
                severity: Severity::Critical,
                description: format!("{consecutive} consecutive failures detected"),
            });
        }

        let failures = recent.iter().filter(|o| !o.success).count();
        let failure_rate = failures as f64 / recent.len() as f64;
        if failure_rate >= 0.3 {
            patterns.push(DetectedPattern {
                name: "high_failure_rate",
                severity: if failure_rate >= 0.5 {
                    Severity::Critical
                } else {
                    Severity::Warning
                },
                description: format!("high failure rate: {:.1}%", failure_rate * 100.0),
            });
        }

        let timeouts = recent
            .iter()
            .filter(|o| o.kind == EventKind::ApiError && o.is_timeout)
            .count();
        if timeouts >= 10 {
            patterns.push(DetectedPattern {
                name: "api_timeout_cluster",
                severity: Severity::Warning,
                description: format!("API timeout cluster detected: {timeouts} timeouts"),
            });
        }

        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_five_consecutive_failures_as_critical() {
        let det = FailurePatternDetector::new(100);
        for _ in 0..9 {
            det.record(EventKind::TradeSuccess, true, false);
        }
        let mut patterns = Vec::new();
        for _ in 0..5 {
            patterns = det.record(EventKind::TradeFailure, false, false);
        }
        assert!(patterns.iter().any(|p| p.name == "consecutive_failures" && p.severity == Severity::Critical));
    }

    #[test]
    fn flags_high_failure_rate_over_last_twenty() {
        let det = FailurePatternDetector::new(100);
        for _ in 0..14 {
            det.record(EventKind::TradeSuccess, true, false);
        }
        let mut patterns = Vec::new();
        for _ in 0..6 {
            patterns = det.record(EventKind::TradeFailure, false, false);
        }
        assert!(patterns.iter().any(|p| p.name == "high_failure_rate"));
    }

    #[test]
    fn below_minimum_sample_size_yields_no_patterns() {
        let det = FailurePatternDetector::new(100);
        for _ in 0..5 {
            let patterns = det.record(EventKind::TradeFailure, false, false);
            assert!(patterns.is_empty());
        }
    }

    #[test]
    fn timeout_cluster_detected_independent_of_failure_rate() {
        let det = FailurePatternDetector::new(100);
        for _ in 0..9 {
            det.record(EventKind::TradeSuccess, true, false);
        }
        let mut patterns = Vec::new();
        for _ in 0..10 {
            patterns = det.record(EventKind::ApiError, false, true);
        }
        assert!(patterns.iter().any(|p| p.name == "api_timeout_cluster"));
    }
}
