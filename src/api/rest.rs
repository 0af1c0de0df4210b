// =============================================================================
// REST API Endpoints — Axum 0.7 (SPEC_FULL.md §6.1 "REST surface")
// =============================================================================
//
// All endpoints live under `/api/v1/`. `health` is public; every other route
// requires a valid Bearer token via the `AuthBearer` extractor. CORS is
// configured permissively, same posture as the teacher's original router.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::api::ApiState;
use crate::config::presets::Preset;
use crate::journal;
use crate::session::manager::StartBotRequest;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/bots/:pair", get(bot_status))
        .route("/api/v1/bots/:pair/start", post(start_bot))
        .route("/api/v1/bots/:pair/stop", post(stop_bot))
        .route("/api/v1/events", get(recent_events))
        .route("/api/v1/trade-journal", get(trade_journal))
        .route("/api/v1/trade-journal/stats", get(trade_journal_stats))
        .layer(cors)
        .with_state(Arc::new(state))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

async fn full_state(_auth: AuthBearer, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.shared_state.read().await {
        Ok(doc) => Json(doc).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to read shared state");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error_body(&e.to_string()))).into_response()
        }
    }
}

async fn bot_status(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Path(pair): Path<String>,
) -> impl IntoResponse {
    match state.shared_state.read().await {
        Ok(doc) => match doc.bots.get(&pair) {
            Some(bot) => Json(bot.clone()).into_response(),
            None => (StatusCode::NOT_FOUND, Json(error_body("no such bot"))).into_response(),
        },
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(error_body(&e.to_string()))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBotBody {
    budget: Decimal,
    #[serde(default)]
    preset: Preset,
    #[serde(default)]
    target_profit_pct: Option<Decimal>,
}

async fn start_bot(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Path(pair): Path<String>,
    Json(body): Json<StartBotBody>,
) -> impl IntoResponse {
    let req = StartBotRequest {
        pair: pair.clone(),
        budget: body.budget,
        preset: body.preset,
        target_profit_pct: body.target_profit_pct,
    };
    match state.sessions.start(req).await {
        Ok(granted) => {
            info!(pair, %granted, "bot start requested via API");
            Json(serde_json::json!({ "pair": pair, "granted": granted })).into_response()
        }
        Err(e) => {
            warn!(pair, error = %e, "failed to start bot");
            (StatusCode::BAD_REQUEST, Json(error_body(&e.to_string()))).into_response()
        }
    }
}

async fn stop_bot(_auth: AuthBearer, State(state): State<Arc<ApiState>>, Path(pair): Path<String>) -> impl IntoResponse {
    match state.sessions.stop(&pair).await {
        Ok(()) => {
            info!(pair, "bot stop requested via API");
            Json(serde_json::json!({ "pair": pair, "stopped": true })).into_response()
        }
        Err(e) => {
            warn!(pair, error = %e, "failed to stop bot");
            (StatusCode::BAD_REQUEST, Json(error_body(&e.to_string()))).into_response()
        }
    }
}

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(default = "default_events_limit")]
    limit: usize,
}

fn default_events_limit() -> usize {
    100
}

async fn recent_events(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    axum::extract::Query(query): axum::extract::Query<EventsQuery>,
) -> impl IntoResponse {
    match read_ndjson_tail(&state.alerts_file, query.limit) {
        Ok(events) => Json(events).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to read alerts file");
            Json(Vec::<serde_json::Value>::new()).into_response()
        }
    }
}

async fn trade_journal(_auth: AuthBearer, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match journal::read_all(&state.log_dir) {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to read trade journal");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error_body(&e.to_string()))).into_response()
        }
    }
}

async fn trade_journal_stats(_auth: AuthBearer, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match journal::read_all(&state.log_dir) {
        Ok(records) => Json(journal::compute_stats(&records)).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to compute trade journal stats");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error_body(&e.to_string()))).into_response()
        }
    }
}

fn error_body(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// Reads the last `limit` lines of an NDJSON file as parsed JSON values.
/// Malformed lines are skipped.
fn read_ndjson_tail(path: &std::path::Path, limit: usize) -> std::io::Result<Vec<serde_json::Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(limit);
    Ok(lines[start..]
        .iter()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_ndjson_tail_on_missing_file_is_empty() {
        let path = std::path::PathBuf::from("/tmp/gatescalp-rest-test-missing.ndjson");
        let _ = std::fs::remove_file(&path);
        assert!(read_ndjson_tail(&path, 10).unwrap().is_empty());
    }

    #[test]
    fn read_ndjson_tail_respects_limit() {
        let path = std::env::temp_dir().join(format!("gatescalp-rest-test-{}.ndjson", std::process::id()));
        let content: String = (0..20).map(|i| format!("{{\"n\":{i}}}\n")).collect();
        std::fs::write(&path, content).unwrap();
        let tail = read_ndjson_tail(&path, 5).unwrap();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[4]["n"], 19);
        let _ = std::fs::remove_file(&path);
    }
}
