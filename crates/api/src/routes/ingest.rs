//! Operator view of the UDP ingestion pipeline.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use radarops_core::types::Timestamp;
use radarops_ingest::StatsSnapshot;
use serde::{Deserialize, Serialize};

use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ResetParams {
    /// Also forget every remembered reading key.
    #[serde(default)]
    pub clear_dedup: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub reset_at: Timestamp,
    /// Dedup entries dropped; zero unless `clear_dedup` was set.
    pub dedup_entries_cleared: usize,
}

#[derive(Debug, Serialize)]
pub struct IngestStatus {
    pub listening: bool,
    pub udp_addr: String,
    pub started_at: Timestamp,
    pub uptime_secs: i64,
    pub dedup_entries: usize,
    pub dedup_capacity: usize,
    pub ws_connections: usize,
    pub event_subscribers: usize,
}

/// GET /api/v1/ingest/stats
async fn get_stats(State(state): State<AppState>) -> Json<DataResponse<StatsSnapshot>> {
    Json(DataResponse {
        data: state.ingest.stats.snapshot(),
    })
}

/// POST /api/v1/ingest/stats/reset?clear_dedup=true
async fn reset_stats(
    State(state): State<AppState>,
    Query(params): Query<ResetParams>,
) -> Json<DataResponse<ResetResponse>> {
    state.ingest.stats.reset();

    let dedup_entries_cleared = if params.clear_dedup {
        let cleared = state.ingest.dedup.len();
        state.ingest.dedup.clear();
        cleared
    } else {
        0
    };

    tracing::info!(
        clear_dedup = params.clear_dedup,
        dedup_entries_cleared,
        "Ingestion stats reset",
    );

    let reset_at = state
        .ingest
        .stats
        .snapshot()
        .last_reset_at
        .unwrap_or_else(chrono::Utc::now);

    Json(DataResponse {
        data: ResetResponse {
            reset_at,
            dedup_entries_cleared,
        },
    })
}

/// GET /api/v1/ingest/status
async fn get_status(State(state): State<AppState>) -> Json<DataResponse<IngestStatus>> {
    let snapshot = state.ingest.stats.snapshot();
    let status = IngestStatus {
        listening: snapshot.listening,
        udp_addr: state.ingest.udp_addr.to_string(),
        started_at: snapshot.started_at,
        uptime_secs: snapshot.uptime_secs,
        dedup_entries: state.ingest.dedup.len(),
        dedup_capacity: state.ingest.dedup.capacity(),
        ws_connections: state.ws_manager.connection_count().await,
        event_subscribers: state.event_bus.subscriber_count(),
    };
    Json(DataResponse { data: status })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/stats/reset", post(reset_stats))
        .route("/status", get(get_status))
}
