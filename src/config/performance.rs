// =============================================================================
// PerformanceConfig — timeouts, polling cadence, preset selection
// =============================================================================

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_lock_timeout_secs() -> u64 {
    5
}

fn default_worker_stop_grace_secs() -> u64 {
    10
}

fn default_health_check_interval_secs() -> u64 {
    5
}

fn default_status_emit_interval_secs() -> u64 {
    5
}

fn default_trading_cycle_interval_secs() -> f64 {
    2.0
}

fn default_production_circuit_breaker() -> bool {
    false
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    #[serde(default = "default_worker_stop_grace_secs")]
    pub worker_stop_grace_secs: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_status_emit_interval_secs")]
    pub status_emit_interval_secs: u64,
    #[serde(default = "default_trading_cycle_interval_secs")]
    pub trading_cycle_interval_secs: f64,
    /// Uses the 300s circuit-breaker cooldown preset instead of 60s
    /// (SPEC_FULL.md §4.6 "raised to 300s in production preset").
    #[serde(default = "default_production_circuit_breaker")]
    pub production_circuit_breaker: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
            worker_stop_grace_secs: default_worker_stop_grace_secs(),
            health_check_interval_secs: default_health_check_interval_secs(),
            status_emit_interval_secs: default_status_emit_interval_secs(),
            trading_cycle_interval_secs: default_trading_cycle_interval_secs(),
            production_circuit_breaker: default_production_circuit_breaker(),
        }
    }
}

impl PerformanceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            bail!("http_timeout_secs must be positive");
        }
        if self.trading_cycle_interval_secs <= 0.0 {
            bail!("trading_cycle_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn circuit_breaker_config(&self) -> crate::circuit_breaker::CircuitBreakerConfig {
        if self.production_circuit_breaker {
            crate::circuit_breaker::CircuitBreakerConfig::production()
        } else {
            crate::circuit_breaker::CircuitBreakerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(PerformanceConfig::default().validate().is_ok());
    }

    #[test]
    fn production_flag_selects_300s_cooldown() {
        let cfg = PerformanceConfig { production_circuit_breaker: true, ..Default::default() };
        assert_eq!(
            cfg.circuit_breaker_config().cooldown,
            std::time::Duration::from_secs(300)
        );
    }
}
