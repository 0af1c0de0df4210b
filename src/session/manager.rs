// =============================================================================
// SessionManager — process supervisor (SPEC_FULL.md §4.14, "the supervisor")
// =============================================================================
//
// Grounded on `session_manager.py`'s `SessionManager` class: one worker
// subprocess per pair, re-invoking the same executable with
// `--worker-mode --pair <P> --config <path>`. Graceful shutdown has no
// portable `SIGTERM`-equivalent without adding a signal-handling crate the
// teacher's stack doesn't carry, so this crate signals "please stop" through
// the same `SharedState` document workers already poll: the supervisor flips
// a bot's lifecycle to `Stopping`, the worker's own poll loop notices and
// exits cleanly, and only a worker that ignores that window for
// `stop_grace` gets `start_kill()`'d (SIGKILL via tokio::process).
// =============================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::process::{Child, Command};
use tokio::time::{interval, sleep, Instant};
use tracing::{error, info, warn};

use crate::config::presets::Preset;
use crate::session::budget::BudgetCoordinator;
use crate::session::shared_state::{BotLifecycleStatus, BotStatus, SharedState};

pub struct StartBotRequest {
    pub pair: String,
    pub budget: Decimal,
    pub preset: Preset,
    pub target_profit_pct: Option<Decimal>,
}

struct TrackedChild {
    child: Child,
}

/// Supervises one worker subprocess per pair. Owns no trading logic itself;
/// its only responsibilities are budget allocation, subprocess lifecycle,
/// and liveness detection.
pub struct SessionManager {
    shared_state: std::sync::Arc<SharedState>,
    budget: std::sync::Arc<BudgetCoordinator>,
    config_dir: PathBuf,
    worker_exe: PathBuf,
    children: Mutex<HashMap<String, TrackedChild>>,
    stop_grace: Duration,
    health_interval: Duration,
}

impl SessionManager {
    pub fn new(
        shared_state: std::sync::Arc<SharedState>,
        budget: std::sync::Arc<BudgetCoordinator>,
        config_dir: impl Into<PathBuf>,
        stop_grace: Duration,
        health_interval: Duration,
    ) -> Result<Self> {
        let worker_exe = std::env::current_exe().context("failed to resolve current executable path")?;
        Ok(Self {
            shared_state,
            budget,
            config_dir: config_dir.into(),
            worker_exe,
            children: Mutex::new(HashMap::new()),
            stop_grace,
            health_interval,
        })
    }

    fn config_path(&self, pair: &str) -> PathBuf {
        self.config_dir.join(format!("{pair}.json"))
    }

    /// Registers and launches a new worker for `pair`. Fails if a worker for
    /// that pair is already tracked, or if the budget coordinator cannot
    /// allocate any amount at all.
    pub async fn start(&self, req: StartBotRequest) -> Result<Decimal> {
        if self.children.lock().contains_key(&req.pair) {
            bail!("bot for pair {} is already running", req.pair);
        }

        let allocation = self.budget.allocate(&req.pair, req.budget).await?;
        if !allocation.ok {
            bail!("insufficient available budget to start {}", req.pair);
        }

        let mut config = req.preset.build(req.pair.as_str(), allocation.granted);
        if let Some(target) = req.target_profit_pct {
            config.trading.target_profit_pct = target;
        }
        config.validate().context("generated config failed validation")?;

        std::fs::create_dir_all(&self.config_dir)
            .with_context(|| format!("failed to create config dir {}", self.config_dir.display()))?;
        let config_path = self.config_path(&req.pair);
        config.save(&config_path)?;

        let child = Command::new(&self.worker_exe)
            .arg("--worker-mode")
            .arg("--pair")
            .arg(&req.pair)
            .arg("--config")
            .arg(&config_path)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn worker process for {}", req.pair))?;

        let pid = child.id();
        self.shared_state
            .update(|doc| {
                let mut status = BotStatus::idle(req.pair.clone());
                status.status = BotLifecycleStatus::Starting;
                status.pid = pid;
                status.started_at = Some(chrono::Utc::now());
                status.allocated_budget = allocation.granted;
                doc.bots.insert(req.pair.clone(), status);
            })
            .await?;

        self.children.lock().insert(req.pair.clone(), TrackedChild { child });
        info!(pair = %req.pair, granted = %allocation.granted, pid, "worker started");
        Ok(allocation.granted)
    }

    /// Requests graceful shutdown: flips the bot's lifecycle to `Stopping`
    /// and waits up to `stop_grace` for the worker to exit on its own before
    /// force-killing it.
    pub async fn stop(&self, pair: &str) -> Result<()> {
        self.shared_state
            .update(|doc| {
                if let Some(bot) = doc.bots.get_mut(pair) {
                    bot.status = BotLifecycleStatus::Stopping;
                }
            })
            .await?;

        let deadline = Instant::now() + self.stop_grace;
        loop {
            let exited = {
                let mut children = self.children.lock();
                match children.get_mut(pair) {
                    Some(tracked) => matches!(tracked.child.try_wait(), Ok(Some(_))),
                    None => true,
                }
            };
            if exited {
                break;
            }
            if Instant::now() >= deadline {
                warn!(pair, "worker did not exit within grace period, force-killing");
                let mut children = self.children.lock();
                if let Some(tracked) = children.get_mut(pair) {
                    let _ = tracked.child.start_kill();
                }
                break;
            }
            sleep(Duration::from_millis(200)).await;
        }

        if let Some(mut tracked) = self.children.lock().remove(pair) {
            let _ = tracked.child.wait().await;
        }

        self.budget.deallocate(pair).await?;
        self.shared_state
            .update(|doc| {
                if let Some(bot) = doc.bots.get_mut(pair) {
                    bot.status = BotLifecycleStatus::Stopped;
                    bot.clear_runtime_fields();
                }
            })
            .await?;
        info!(pair, "worker stopped");
        Ok(())
    }

    /// Runs forever, polling tracked children for unexpected exits. A dead
    /// child whose bot is still `Starting`/`Running` is marked `Error` and
    /// its budget released (§4.14 "health loop").
    pub async fn run_health_loop(&self) {
        let mut ticker = interval(self.health_interval);
        loop {
            ticker.tick().await;
            let dead: Vec<String> = {
                let mut children = self.children.lock();
                let mut dead = Vec::new();
                for (pair, tracked) in children.iter_mut() {
                    match tracked.child.try_wait() {
                        Ok(Some(status)) => {
                            warn!(pair, ?status, "worker exited unexpectedly");
                            dead.push(pair.clone());
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!(pair, error = %e, "failed to poll worker status");
                        }
                    }
                }
                dead
            };

            for pair in dead {
                self.children.lock().remove(&pair);
                if let Err(e) = self.budget.deallocate(&pair).await {
                    error!(pair, error = %e, "failed to deallocate budget after worker crash");
                }
                let res = self
                    .shared_state
                    .update(|doc| {
                        if let Some(bot) = doc.bots.get_mut(&pair) {
                            if matches!(bot.status, BotLifecycleStatus::Starting | BotLifecycleStatus::Running) {
                                bot.status = BotLifecycleStatus::Error;
                                bot.errors_count += 1;
                            }
                            bot.clear_runtime_fields();
                        }
                    })
                    .await;
                if let Err(e) = res {
                    error!(pair = %pair, error = %e, "failed to record worker crash in shared state");
                }
            }
        }
    }

    /// Stops every tracked worker; used on supervisor shutdown (SIGINT/SIGTERM).
    pub async fn shutdown_all(&self) {
        let pairs: Vec<String> = self.children.lock().keys().cloned().collect();
        for pair in pairs {
            if let Err(e) = self.stop(&pair).await {
                error!(pair = %pair, error = %e, "error stopping worker during shutdown");
            }
        }
    }

    pub fn active_pairs(&self) -> Vec<String> {
        self.children.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_scoped_to_pair() {
        let dir = PathBuf::from("/tmp/gatescalp-config-test");
        let shared = std::sync::Arc::new(SharedState::new("/tmp/gatescalp-config-test/shared_state.json"));
        // Construction only; no subprocess spawned by this test.
        let _ = shared;
        let joined = dir.join("BTC_USDT.json");
        assert_eq!(joined.file_name().unwrap().to_str().unwrap(), "BTC_USDT.json");
    }
}
