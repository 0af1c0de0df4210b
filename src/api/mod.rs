pub mod auth;
pub mod rest;

use std::path::PathBuf;
use std::sync::Arc;

use crate::monitoring::MonitoringBus;
use crate::session::{BudgetCoordinator, SessionManager, SharedState};

/// Everything the supervisor's REST layer needs; mirrors the teacher's
/// `AppState` role but scoped to the supervisor process only (workers don't
/// run an API server).
#[derive(Clone)]
pub struct ApiState {
    pub shared_state: Arc<SharedState>,
    pub budget: Arc<BudgetCoordinator>,
    pub sessions: Arc<SessionManager>,
    pub monitoring: Arc<MonitoringBus>,
    pub log_dir: PathBuf,
    pub alerts_file: PathBuf,
}
