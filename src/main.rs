// =============================================================================
// gatescalp — Gate.io spot scalping engine, entry point
// =============================================================================
//
// Two process roles share this one binary (SPEC_FULL.md §2.1 "process
// topology"):
//   - supervisor (default): owns SharedState + BudgetCoordinator, spawns one
//     worker subprocess per active pair, serves the REST control surface.
//   - worker (`--worker-mode`): runs a single TradingEngine to completion for
//     one pair, re-invoked by the supervisor with its own config file.
// =============================================================================

mod api;
mod circuit_breaker;
mod config;
mod engine;
mod error;
mod exchange;
mod journal;
mod logging;
mod monitoring;
mod order_service;
mod rate_limit;
mod retry;
mod safe_sleep;
mod session;
mod smart_cache;
mod wallet;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::ConfigModel;
use crate::engine::{EngineConfig, EngineExitReason, TradingEngine};
use crate::exchange::types::OrderType;
use crate::exchange::ExchangeClient;
use crate::monitoring::{LogAnalyzer, MonitoringBus};
use crate::safe_sleep::{SafeSleepManager, SleepLimits};
use crate::session::manager::StartBotRequest;
use crate::session::shared_state::BotLifecycleStatus;
use crate::session::{BudgetCoordinator, SessionManager, SharedState};

/// Interval between `LogAnalyzer` passes (§4.7 "on each tick"); the source
/// leaves the exact cadence unspecified beyond "periodic", this crate picks
/// a value well under the 1h monitoring-relevant horizon without re-reading
/// multi-hour log files on every trading cycle.
const LOG_ANALYSIS_INTERVAL_SECS: u64 = 300;

#[derive(Parser, Debug)]
#[command(name = "gatescalp", about = "Gate.io spot scalping engine")]
struct Cli {
    /// Run as a single-pair worker instead of the supervisor.
    #[arg(long)]
    worker_mode: bool,

    /// Trading pair, e.g. BTC_USDT. Required with --worker-mode.
    #[arg(long)]
    pair: Option<String>,

    /// Path to a ConfigModel JSON file. Required with --worker-mode.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Starting budget for a one-shot bot registered at supervisor launch,
    /// via GATE_AUTOSTART_PAIR / GATE_AUTOSTART_BUDGET env vars instead.
    #[arg(long)]
    budget: Option<Decimal>,

    /// Override target profit percent for an autostarted bot.
    #[arg(long)]
    target: Option<Decimal>,

    /// Address the supervisor's REST API binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind_addr: String,

    /// Directory holding per-pair ConfigModel JSON files.
    #[arg(long, default_value = "bot_configs")]
    config_dir: PathBuf,

    /// Path to the shared cross-process status document.
    #[arg(long, default_value = "shared_state.json")]
    shared_state_path: PathBuf,

    /// Directory for the per-day trade audit CSV/NDJSON logs.
    #[arg(long, default_value = "trading_logs")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let log_component = match (&cli.worker_mode, &cli.pair) {
        (true, Some(pair)) => pair.clone(),
        _ => "supervisor".to_string(),
    };
    logging::init(&cli.log_dir, &log_component);

    if cli.worker_mode {
        run_worker(cli).await
    } else {
        run_supervisor(cli).await
    }
}

fn exchange_credentials() -> anyhow::Result<(String, String)> {
    let key = std::env::var("GATE_API_KEY").unwrap_or_default();
    let secret = std::env::var("GATE_SECRET_KEY").unwrap_or_default();
    if key.is_empty() || secret.is_empty() {
        warn!("GATE_API_KEY / GATE_SECRET_KEY not set — signed requests will be rejected by Gate.io");
    }
    Ok((key, secret))
}

// =============================================================================
// Worker process
// =============================================================================

async fn run_worker(cli: Cli) -> anyhow::Result<()> {
    let pair = cli.pair.clone().ok_or_else(|| anyhow::anyhow!("--worker-mode requires --pair"))?;
    let config_path = cli.config.clone().ok_or_else(|| anyhow::anyhow!("--worker-mode requires --config"))?;

    info!(pair = %pair, config = %config_path.display(), "worker starting");

    let config = ConfigModel::load(&config_path)?;
    let (key, secret) = exchange_credentials()?;

    let sleeper = Arc::new(SafeSleepManager::new(SleepLimits::trading()));
    let exchange = Arc::new(ExchangeClient::new(key, secret, sleeper.clone()));

    let alerts_path = cli.log_dir.join(format!("alerts-{}.ndjson", pair));
    let monitoring = Arc::new(MonitoringBus::new(Some(alerts_path)));

    let breaker_config = config.performance.circuit_breaker_config();
    let breaker = Arc::new(CircuitBreaker::new(pair.clone(), breaker_config));

    let exit_fee_rate = exchange
        .effective_fee_rate(OrderType::Market, config.trading.budget_per_trade)
        .await
        .unwrap_or(Decimal::new(2, 3));

    let session_id = uuid::Uuid::new_v4().to_string();
    let engine_config = EngineConfig {
        pair: pair.clone(),
        session_id,
        target_profit_pct: config.trading.target_profit_pct,
        position_timeout_secs: config.trading.position_timeout_secs,
        dca_config: config.dca.to_ladder_config(),
        budget_per_trade: config.trading.budget_per_trade,
        max_trade_amount: config.security.max_trade_amount,
        exit_fee_rate,
        trading_cycle_interval_secs: config.performance.trading_cycle_interval_secs,
        safety: engine::SafetyConfig {
            max_daily_loss: config.security.max_daily_loss,
            min_win_rate: config.security.min_win_rate,
            min_trades_for_win_rate_check: config.security.min_trades_for_win_rate_check,
        },
    };

    let stop_requested = Arc::new(AtomicBool::new(false));
    let engine = Arc::new(TradingEngine::new(
        engine_config,
        exchange,
        monitoring,
        sleeper,
        breaker,
        cli.log_dir.clone(),
        stop_requested.clone(),
    ));

    // Supervisor signals a stop by flipping this worker's SharedState entry
    // to `Stopping`; poll for that alongside the local ctrl_c handler since a
    // worker may also be run stand-alone for debugging (§4.14).
    let shared_state = Arc::new(SharedState::new(&cli.shared_state_path));
    {
        let shared_state = shared_state.clone();
        let pair = pair.clone();
        let stop_requested = stop_requested.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(2));
            loop {
                ticker.tick().await;
                if let Ok(doc) = shared_state.read().await {
                    if let Some(bot) = doc.bots.get(&pair) {
                        if bot.status == BotLifecycleStatus::Stopping {
                            stop_requested.store(true, Ordering::Relaxed);
                            return;
                        }
                    }
                }
            }
        });
    }
    {
        let stop_requested = stop_requested.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("worker received Ctrl+C, requesting graceful stop");
                stop_requested.store(true, Ordering::Relaxed);
            }
        });
    }

    {
        let engine = engine.clone();
        let monitoring = engine.monitoring_handle();
        let pair = pair.clone();
        let log_dir = cli.log_dir.clone();
        tokio::spawn(async move {
            let analyzer = LogAnalyzer::new(&log_dir);
            let mut ticker = tokio::time::interval(Duration::from_secs(LOG_ANALYSIS_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                monitoring.run_log_analysis(&analyzer, &pair, 1, &engine.profit_history());
            }
        });
    }

    let reason = engine.run().await;
    info!(pair = %pair, ?reason, "worker exiting");

    match reason {
        EngineExitReason::StopRequested | EngineExitReason::Shutdown => Ok(()),
        other => anyhow::bail!("worker for {} stopped abnormally: {:?}", pair, other),
    }
}

// =============================================================================
// Supervisor process
// =============================================================================

async fn run_supervisor(cli: Cli) -> anyhow::Result<()> {
    info!("gatescalp supervisor starting");

    let (key, secret) = exchange_credentials()?;
    let sleeper = Arc::new(SafeSleepManager::new(SleepLimits::api()));
    let exchange = Arc::new(ExchangeClient::new(key, secret, sleeper));

    let shared_state = Arc::new(SharedState::new(&cli.shared_state_path));
    let budget = Arc::new(BudgetCoordinator::new(exchange.clone(), shared_state.clone()));
    budget.update().await.unwrap_or_else(|e| warn!(error = %e, "initial budget refresh failed"));

    let sessions = Arc::new(SessionManager::new(
        shared_state.clone(),
        budget.clone(),
        cli.config_dir.clone(),
        Duration::from_secs(10),
        Duration::from_secs(5),
    )?);

    let monitoring = Arc::new(MonitoringBus::new(Some(cli.log_dir.join("alerts-supervisor.ndjson"))));

    if let (Some(pair), Some(budget_amount)) = (cli.pair.clone(), cli.budget) {
        let preset = std::env::var("GATE_AUTOSTART_PRESET")
            .ok()
            .and_then(|s| match s.as_str() {
                "conservative" => Some(config::presets::Preset::Conservative),
                "aggressive" => Some(config::presets::Preset::Aggressive),
                _ => Some(config::presets::Preset::Moderate),
            })
            .unwrap_or_default();
        match sessions
            .start(StartBotRequest { pair: pair.clone(), budget: budget_amount, preset, target_profit_pct: cli.target })
            .await
        {
            Ok(granted) => info!(pair = %pair, %granted, "autostarted bot from CLI flags"),
            Err(e) => error!(pair = %pair, error = %e, "failed to autostart bot"),
        }
    }

    {
        let sessions = sessions.clone();
        tokio::spawn(async move { sessions.run_health_loop().await });
    }

    let api_state = api::ApiState {
        shared_state: shared_state.clone(),
        budget: budget.clone(),
        sessions: sessions.clone(),
        monitoring: monitoring.clone(),
        log_dir: cli.log_dir.clone(),
        alerts_file: cli.log_dir.join("alerts-supervisor.ndjson"),
    };

    let app = api::rest::router(api_state);
    let listener = tokio::net::TcpListener::bind(&cli.bind_addr).await?;
    info!(addr = %cli.bind_addr, "REST API listening");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "REST API server failed");
        }
    });

    info!("supervisor running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping all workers");
    sessions.shutdown_all().await;
    server.abort();

    info!("gatescalp supervisor shut down complete.");
    Ok(())
}
