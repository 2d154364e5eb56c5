use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::models::{DateRange, PipelineResult};
use crate::pipeline::{HealthCheck, PipelineConfig, PipelineStatusView};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/run", post(run))
        .route("/cancel", post(cancel))
        .route("/status", get(status))
        .route("/health", get(health_check))
}

#[derive(Debug, Deserialize, Default)]
struct RunRequest {
    #[serde(default)]
    symbols: Vec<String>,
    #[serde(default = "default_lookback_days")]
    lookback_days: i64,
}

fn default_lookback_days() -> i64 {
    1
}

/// POST /api/pipeline/run - Runs one pipeline pass and returns its result.
async fn run(State(state): State<AppState>, body: Option<Json<RunRequest>>) -> Result<Json<PipelineResult>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    info!(symbols = ?body.symbols, lookback_days = body.lookback_days, "POST /api/pipeline/run");

    let range = DateRange::last_days(body.lookback_days.max(1));
    let config = PipelineConfig::new(body.symbols, range);
    Ok(Json(state.pipeline.run(config).await))
}

/// POST /api/pipeline/cancel - Requests cancellation of the in-flight run.
async fn cancel(State(state): State<AppState>) -> &'static str {
    state.pipeline.cancel();
    "cancellation requested"
}

/// GET /api/pipeline/status
async fn status(State(state): State<AppState>) -> Json<PipelineStatusView> {
    Json(state.pipeline.status().await)
}

/// GET /api/pipeline/health
async fn health_check(State(state): State<AppState>) -> Json<HealthCheck> {
    Json(state.pipeline.health_check().await)
}
