use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when the database and the UDP listener are both up.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    pub listening: bool,
}

/// GET /health -- service, database and listener health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = radarops_db::health_check(&state.pool).await.is_ok();
    let listening = state.ingest.stats.is_listening();

    let status = if db_healthy && listening { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        listening,
    })
}

/// Mount health check routes (root level, not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
