use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radarops_api::broadcast::EventBroadcaster;
use radarops_api::config::{LogFormat, ServerConfig};
use radarops_api::ingest::{exit_code, spawn_listener};
use radarops_api::state::{AppState, IngestHandle};
use radarops_api::{routes, ws};
use radarops_core::ports::CaptureIndex;
use radarops_ingest::capture_index::CaptureIndexer;
use radarops_ingest::{Collaborators, IngestConfig, Pipeline, UdpListener};

/// How long the listener gets to drain its queue on shutdown.
const INGEST_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "radarops_api=debug,radarops_ingest=debug,tower_http=debug".into()
    });
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let ingest_config = match IngestConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Invalid ingestion configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(
        udp_bind_addr = %ingest_config.udp_bind_addr,
        speed_limit = ingest_config.speed_limit,
        workers = ingest_config.workers,
        queue_capacity = ingest_config.queue_capacity,
        "Loaded ingestion configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = radarops_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    radarops_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    radarops_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Event bus ---
    let event_bus = Arc::new(radarops_events::EventBus::default());
    let broadcaster_handle = tokio::spawn(
        EventBroadcaster::new(Arc::clone(&ws_manager)).run(event_bus.subscribe()),
    );
    tracing::info!("Event bus created, dashboard push started");

    // --- Ingestion ---
    // Cancelling `shutdown` stops every background task. A fatal listener
    // error cancels it as well.
    let shutdown = CancellationToken::new();
    let store = Arc::new(radarops_db::PgStore::new(pool.clone()));
    let pipeline = Arc::new(Pipeline::new(
        &ingest_config,
        Collaborators::from_store(Arc::clone(&store)),
        Arc::clone(&event_bus),
    ));

    let listener = match UdpListener::bind(&ingest_config, Arc::clone(&pipeline)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "UDP listener could not start");
            std::process::exit(1);
        }
    };
    let udp_addr = listener.local_addr();

    let listener_handle = spawn_listener(listener, shutdown.clone());

    let indexer_handle = ingest_config.capture_dir.clone().map(|dir| {
        let index: Arc<dyn CaptureIndex> = store.clone();
        let indexer = CaptureIndexer::new(dir, index, ingest_config.clock_offset);
        tokio::spawn(indexer.run(ingest_config.capture_scan_interval, shutdown.clone()))
    });
    if indexer_handle.is_none() {
        tracing::info!("CAPTURE_DIR not set, capture indexer disabled");
    }

    let reporter_handle = tokio::spawn(radarops_ingest::stats::run_reporter(
        Arc::clone(pipeline.stats()),
        ingest_config.stats_log_interval,
        shutdown.clone(),
    ));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
        ingest: IngestHandle {
            stats: Arc::clone(pipeline.stats()),
            dedup: Arc::clone(pipeline.dedup()),
            udp_addr,
        },
    };

    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    shutdown.cancel();
    let status = match tokio::time::timeout(INGEST_DRAIN_TIMEOUT, listener_handle).await {
        Ok(outcome) => exit_code(&outcome),
        Err(_) => {
            tracing::warn!("UDP listener did not drain in time");
            0
        }
    };
    if let Some(handle) = indexer_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), reporter_handle).await;
    tracing::info!("Ingestion stopped");

    // The broadcaster exits once the last bus handle is dropped.
    drop(pipeline);
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), broadcaster_handle).await;

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!(status, "Graceful shutdown complete");
    if status != 0 {
        std::process::exit(status);
    }
}

/// Wait for SIGINT, SIGTERM or an internal shutdown request.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = shutdown.cancelled() => {
            tracing::info!("Internal shutdown requested");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
