// =============================================================================
// SharedState — file-locked JSON document, the single cross-process source
// of truth for bot statuses + global budget (SPEC_FULL.md §4.13)
// =============================================================================
//
// Ported from `session_manager.py`'s `SharedState` class: an atomic
// exclusive-create lock file (`open(path, 'x')` -> here,
// `OpenOptions::new().create_new(true)`), 10ms poll granularity, 5s default
// timeout. This crate keeps the literal design rather than substituting an
// OS-level flock because the lock-acquisition behavior is itself one of the
// testable properties of §8 ("lock safety").
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::engine::EngineState;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BotLifecycleStatus {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

/// Cross-process bot status document, §3 "Bot status".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub pair: String,
    pub status: BotLifecycleStatus,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allocated_budget: Decimal,
    #[serde(default)]
    pub current_position_qty: Option<Decimal>,
    #[serde(default)]
    pub engine_state: Option<EngineState>,
    #[serde(default)]
    pub trades_today: u32,
    #[serde(default)]
    pub pnl_percent: Decimal,
    #[serde(default)]
    pub last_action: Option<String>,
    #[serde(default)]
    pub last_action_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors_count: u32,
}

impl BotStatus {
    pub fn idle(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            status: BotLifecycleStatus::Idle,
            pid: None,
            started_at: None,
            allocated_budget: Decimal::ZERO,
            current_position_qty: None,
            engine_state: None,
            trades_today: 0,
            pnl_percent: Decimal::ZERO,
            last_action: None,
            last_action_at: None,
            errors_count: 0,
        }
    }

    /// Runtime-only fields are cleared on restart (§3 "Lifecycles").
    pub fn clear_runtime_fields(&mut self) {
        self.pid = None;
        self.current_position_qty = None;
        self.engine_state = None;
    }
}

/// Global budget document, §3 "Global budget".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalBudget {
    #[serde(default)]
    pub total_quote: Decimal,
    #[serde(default)]
    pub allocated_quote: Decimal,
    #[serde(default)]
    pub available_quote: Decimal,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
}

impl Default for GlobalBudget {
    fn default() -> Self {
        Self {
            total_quote: Decimal::ZERO,
            allocated_quote: Decimal::ZERO,
            available_quote: Decimal::ZERO,
            last_update: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemStatus {
    Running,
    Degraded,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedDocument {
    #[serde(default)]
    pub bots: HashMap<String, BotStatus>,
    #[serde(default)]
    pub global_budget: GlobalBudget,
    #[serde(default = "default_system_status")]
    pub system_status: SystemStatus,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
}

fn default_system_status() -> SystemStatus {
    SystemStatus::Running
}

impl Default for SharedDocument {
    fn default() -> Self {
        Self {
            bots: HashMap::new(),
            global_budget: GlobalBudget::default(),
            system_status: SystemStatus::Running,
            last_update: Utc::now(),
        }
    }
}

/// Handle to the on-disk shared state file plus its sibling lock file.
pub struct SharedState {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

/// RAII guard released when a read-modify-write sequence completes; dropping
/// it removes the lock file even on an early `?` return.
struct LockGuard<'a> {
    lock_path: &'a Path,
}

impl<'a> Drop for LockGuard<'a> {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(self.lock_path);
    }
}

impl SharedState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_lock_timeout(path, Duration::from_secs(5))
    }

    pub fn with_lock_timeout(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("json.lock");
        Self { path, lock_path, lock_timeout }
    }

    async fn acquire_lock(&self) -> Result<LockGuard<'_>> {
        let start = Instant::now();
        loop {
            match std::fs::OpenOptions::new().write(true).create_new(true).open(&self.lock_path) {
                Ok(_) => return Ok(LockGuard { lock_path: &self.lock_path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if start.elapsed() >= self.lock_timeout {
                        bail!("lock-timeout: could not acquire {} within {:?}", self.lock_path.display(), self.lock_timeout);
                    }
                    sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e).context("failed to create shared-state lock file"),
            }
        }
    }

    fn read_document(&self) -> Result<SharedDocument> {
        if !self.path.exists() {
            return Ok(SharedDocument::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read shared state from {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(SharedDocument::default());
        }
        serde_json::from_str(&content).with_context(|| format!("failed to parse shared state from {}", self.path.display()))
    }

    fn write_document(&self, doc: &SharedDocument) -> Result<()> {
        let content = serde_json::to_string_pretty(doc).context("failed to serialize shared state")?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp shared state to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename tmp shared state to {}", self.path.display()))?;
        Ok(())
    }

    /// Readers also take the lock, so they never observe a partial write
    /// (§4.13 "Readers also take the lock").
    pub async fn read(&self) -> Result<SharedDocument> {
        let _guard = self.acquire_lock().await?;
        self.read_document()
    }

    /// Read-modify-write under the lock. `f` receives a mutable reference to
    /// the current document and may mutate it in place.
    pub async fn update<F>(&self, f: F) -> Result<SharedDocument>
    where
        F: FnOnce(&mut SharedDocument),
    {
        let _guard = self.acquire_lock().await?;
        let mut doc = self.read_document()?;
        f(&mut doc);
        doc.last_update = Utc::now();
        self.write_document(&doc)?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_like::TempDir;

    /// Minimal scratch-directory helper so this module doesn't need an
    /// external tempfile dependency the rest of the crate doesn't carry.
    mod tempfile_like {
        use std::path::PathBuf;

        pub struct TempDir(pub PathBuf);

        impl TempDir {
            pub fn new(label: &str) -> Self {
                let dir = std::env::temp_dir().join(format!("gatescalp-test-{label}-{}", std::process::id()));
                let _ = std::fs::create_dir_all(&dir);
                Self(dir)
            }

            pub fn path(&self, name: &str) -> PathBuf {
                self.0.join(name)
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[tokio::test]
    async fn read_on_missing_file_returns_default_document() {
        let dir = TempDir::new("missing");
        let state = SharedState::new(dir.path("shared_state.json"));
        let doc = state.read().await.unwrap();
        assert!(doc.bots.is_empty());
    }

    #[tokio::test]
    async fn update_persists_across_instances() {
        let dir = TempDir::new("persist");
        let path = dir.path("shared_state.json");
        let state = SharedState::new(&path);
        state
            .update(|doc| {
                doc.bots.insert("BTC_USDT".to_string(), BotStatus::idle("BTC_USDT"));
            })
            .await
            .unwrap();

        let state2 = SharedState::new(&path);
        let doc = state2.read().await.unwrap();
        assert!(doc.bots.contains_key("BTC_USDT"));
    }

    #[tokio::test]
    async fn concurrent_updates_serialize_without_interleaving() {
        let dir = TempDir::new("concurrent");
        let path = dir.path("shared_state.json");
        let state = std::sync::Arc::new(SharedState::new(&path));

        let mut handles = Vec::new();
        for i in 0..10 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                state
                    .update(move |doc| {
                        doc.bots.insert(format!("PAIR{i}_USDT"), BotStatus::idle(format!("PAIR{i}_USDT")));
                    })
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let doc = state.read().await.unwrap();
        assert_eq!(doc.bots.len(), 10);
    }

    #[tokio::test]
    async fn lock_file_is_removed_after_update() {
        let dir = TempDir::new("lockfile");
        let path = dir.path("shared_state.json");
        let state = SharedState::new(&path);
        state.update(|_| {}).await.unwrap();
        assert!(!dir.path("shared_state.json.lock").exists());
    }
}
