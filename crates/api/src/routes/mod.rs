pub mod captures;
pub mod health;
pub mod ingest;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                          WebSocket event push
///
/// /ingest/stats                counters (GET)
/// /ingest/stats/reset          zero counters, optionally clear dedup (POST)
/// /ingest/status               listener state and bound UDP address (GET)
///
/// /captures/plate              plate recogniser result for a capture (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/ingest", ingest::router())
        .nest("/captures", captures::router())
}
