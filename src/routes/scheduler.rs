use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::errors::AppError;
use crate::models::SchedulerEvent;
use crate::scheduler_state::RunHistoryEntry;
use crate::scheduler::ScheduledJobView;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id/enable", post(enable_job))
        .route("/jobs/:id/disable", post(disable_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs/refresh", post(refresh_jobs))
        .route("/history", get(history))
        .route("/events", get(events))
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<ScheduledJobView>> {
    Json(state.scheduler.list_jobs())
}

async fn enable_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<&'static str, AppError> {
    state.scheduler.enable_job(&id)?;
    Ok("enabled")
}

async fn disable_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<&'static str, AppError> {
    state.scheduler.disable_job(&id)?;
    Ok("disabled")
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<&'static str, AppError> {
    state.scheduler.cancel_job(&id)?;
    Ok("cancellation requested")
}

async fn refresh_jobs(State(state): State<AppState>) -> &'static str {
    state.scheduler.refresh_scheduled_jobs();
    "refreshed"
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_history_days")]
    days: i64,
}

fn default_history_days() -> i64 {
    7
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HashMap<NaiveDate, HashMap<String, Vec<RunHistoryEntry>>>> {
    Json(state.scheduler.get_run_history(query.days))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    since: Option<DateTime<Utc>>,
}

async fn events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> Json<Vec<SchedulerEvent>> {
    Json(state.scheduler.get_recent_job_events(query.since))
}
