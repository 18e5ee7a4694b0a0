use std::net::SocketAddr;
use std::sync::Arc;

use radarops_core::dedup::Deduplicator;
use radarops_events::EventBus;
use radarops_ingest::IngestStats;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything shared sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: radarops_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (dashboard clients).
    pub ws_manager: Arc<WsManager>,
    pub event_bus: Arc<EventBus>,
    pub ingest: IngestHandle,
}

/// The parts of the running ingestion pipeline exposed over HTTP.
#[derive(Clone)]
pub struct IngestHandle {
    pub stats: Arc<IngestStats>,
    pub dedup: Arc<Deduplicator>,
    /// Address the UDP listener is bound to.
    pub udp_addr: SocketAddr,
}
