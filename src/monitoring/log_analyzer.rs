// =============================================================================
// LogAnalyzer — scans recent engine log files for anomaly patterns
// =============================================================================
//
// Ported from `advanced_monitoring_system.py`'s `LogAnalyzer`. The engine logs
// to stdout/file via `tracing`; this analyzer re-reads whatever file sink is
// configured (a plain `trading_logs/engine.log`, one line per tracing event)
// and regex-matches lines the same way the source does, rather than hooking
// into `tracing`'s subscriber pipeline directly — keeping the analyzer fully
// decoupled from the logging backend, as SPEC_FULL.md §4.7 describes it
// ("analyzes recent engine logs") without tying it to any particular tracing
// layer.
// =============================================================================

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use regex::Regex;
use serde::Serialize;
use tracing::warn;

pub struct LogPatterns {
    pub success: Regex,
    pub failure: Regex,
    pub api_error: Regex,
    pub rate_limit: Regex,
    pub circuit_breaker: Regex,
}

impl Default for LogPatterns {
    fn default() -> Self {
        Self {
            success: Regex::new(r"(?i)trade success|SELL.*profit=[0-9.\-]+").unwrap(),
            failure: Regex::new(r"(?i)trade failed|error|FAILED").unwrap(),
            api_error: Regex::new(r"(?i)api.*(failed|error|timeout)").unwrap(),
            rate_limit: Regex::new(r"(?i)rate limit").unwrap(),
            circuit_breaker: Regex::new(r"(?i)circuit breaker").unwrap(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogAnalysis {
    pub total_events: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub api_failures: u64,
    pub rate_limit_hits: u64,
    pub circuit_breaker_triggers: u64,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub kind: &'static str,
    pub severity: &'static str,
    pub description: String,
}

pub struct LogAnalyzer {
    log_dir: PathBuf,
    patterns: LogPatterns,
}

impl LogAnalyzer {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            patterns: LogPatterns::default(),
        }
    }

    /// Scans `*.log` files under `log_dir` modified within the last
    /// `hours_back` hours, counting pattern matches and flagging anomalies.
    /// `realized_profits` supplies the last-N-vs-prior-N comparison used for
    /// the profit-decline anomaly (the engine tracks these independently of
    /// log text; the source scraped them out of the success-line regex).
    pub fn analyze_recent(&self, hours_back: u64, realized_profits: &[f64]) -> LogAnalysis {
        let mut analysis = LogAnalysis::default();
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(hours_back * 3600))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for path in self.recent_log_files(cutoff) {
            if let Ok(content) = std::fs::read_to_string(&path) {
                for line in content.lines() {
                    self.tally_line(line, &mut analysis);
                }
            } else {
                warn!(path = %path.display(), "failed to read log file for analysis");
            }
        }

        self.detect_anomalies(&mut analysis, realized_profits);
        analysis
    }

    fn recent_log_files(&self, cutoff: SystemTime) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.log_dir) else {
            return files;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    if modified >= cutoff {
                        files.push(path);
                    }
                }
            }
        }
        files.sort();
        files
    }

    fn tally_line(&self, line: &str, analysis: &mut LogAnalysis) {
        if self.patterns.success.is_match(line) {
            analysis.total_events += 1;
            analysis.success_count += 1;
        } else if self.patterns.api_error.is_match(line) {
            analysis.total_events += 1;
            analysis.error_count += 1;
            analysis.api_failures += 1;
        } else if self.patterns.failure.is_match(line) {
            analysis.total_events += 1;
            analysis.error_count += 1;
        }

        if self.patterns.rate_limit.is_match(line) {
            analysis.rate_limit_hits += 1;
        }
        if self.patterns.circuit_breaker.is_match(line) {
            analysis.circuit_breaker_triggers += 1;
        }
    }

    fn detect_anomalies(&self, analysis: &mut LogAnalysis, realized_profits: &[f64]) {
        if analysis.total_events > 0 {
            let error_rate = analysis.error_count as f64 / analysis.total_events as f64;
            if error_rate > 0.2 {
                analysis.anomalies.push(Anomaly {
                    kind: "high_error_rate",
                    severity: if error_rate < 0.5 { "warning" } else { "critical" },
                    description: format!("high error rate detected: {:.1}%", error_rate * 100.0),
                });
            }
        }

        if analysis.rate_limit_hits > 5 {
            analysis.anomalies.push(Anomaly {
                kind: "frequent_rate_limiting",
                severity: "warning",
                description: format!("frequent rate limiting: {} hits", analysis.rate_limit_hits),
            });
        }

        if analysis.circuit_breaker_triggers > 3 {
            analysis.anomalies.push(Anomaly {
                kind: "multiple_circuit_breakers",
                severity: "critical",
                description: format!(
                    "multiple circuit breaker triggers: {}",
                    analysis.circuit_breaker_triggers
                ),
            });
        }

        if realized_profits.len() >= 20 {
            let n = realized_profits.len();
            let recent = &realized_profits[n - 10..];
            let older = &realized_profits[n - 20..n - 10];
            let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;
            let older_avg = older.iter().sum::<f64>() / older.len() as f64;
            if older_avg > 0.0 && recent_avg < older_avg * 0.7 {
                analysis.anomalies.push(Anomaly {
                    kind: "performance_degradation",
                    severity: "warning",
                    description: format!(
                        "performance decline detected: {recent_avg:.4} vs {older_avg:.4}"
                    ),
                });
            }
        }
    }
}

pub fn default_log_dir() -> PathBuf {
    Path::new("trading_logs").to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_high_error_rate() {
        let analyzer = LogAnalyzer::new("/tmp/does-not-exist-gatescalp");
        let mut analysis = LogAnalysis {
            total_events: 10,
            error_count: 3,
            ..Default::default()
        };
        analyzer.detect_anomalies(&mut analysis, &[]);
        assert!(analysis.anomalies.iter().any(|a| a.kind == "high_error_rate"));
    }

    #[test]
    fn flags_performance_degradation_on_thirty_percent_drop() {
        let analyzer = LogAnalyzer::new("/tmp/does-not-exist-gatescalp");
        let mut older = vec![1.0; 10];
        let mut recent = vec![0.5; 10];
        older.append(&mut recent);
        let mut analysis = LogAnalysis::default();
        analyzer.detect_anomalies(&mut analysis, &older);
        assert!(analysis.anomalies.iter().any(|a| a.kind == "performance_degradation"));
    }

    #[test]
    fn no_anomalies_on_clean_log() {
        let analyzer = LogAnalyzer::new("/tmp/does-not-exist-gatescalp");
        let mut analysis = LogAnalysis {
            total_events: 10,
            error_count: 0,
            ..Default::default()
        };
        analyzer.detect_anomalies(&mut analysis, &[]);
        assert!(analysis.anomalies.is_empty());
    }
}
