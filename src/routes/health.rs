use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub sessions: SessionHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHealth {
    pub live: usize,
    pub queue_len: usize,
    pub garbage: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    let stats = state.reaper_stats();
    Json(HealthReport {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        sessions: SessionHealth {
            live: state.sessions().len().await,
            queue_len: stats.queue_len,
            garbage: stats.garbage,
        },
    })
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
