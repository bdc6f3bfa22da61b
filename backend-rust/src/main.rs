use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use droneops_backend::authz::AuthEngine;
use droneops_backend::feed::{start_sensor_feed, FeedConfig};
use droneops_backend::handlers::{build_router, mark_startup, AppState};
use droneops_backend::service::DroneOpsService;
use droneops_backend::store::Store;

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Record startup time for uptime reporting
    mark_startup();

    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "droneops_backend=info".into()),
        )
        .init();

    let mode = std::env::var("DRONE_OPS_MODE").unwrap_or_else(|_| "local".into());
    info!(
        "Drone Ops Backend v{} starting — mode: {mode}",
        env!("CARGO_PKG_VERSION")
    );

    // Restore persisted store state
    let snapshot_path = std::env::var("DRONE_OPS_STATE_FILE")
        .unwrap_or_else(|_| "droneops-state.json".to_string());
    let store = Arc::new(Store::load(Some(snapshot_path.into())).await);

    // Service with built-in collaborator implementations
    let service = Arc::new(DroneOpsService::with_defaults(store));
    let auth = Arc::new(AuthEngine::from_env());

    // UDP sensor feed (scanner collaborators push events here)
    tokio::spawn(start_sensor_feed(FeedConfig::default(), service.clone()));

    // Periodic store snapshot flush
    tokio::spawn(service.clone().run_snapshot_flush(Duration::from_secs(30)));

    // CORS — local dev defaults; set CORS_ORIGINS=* for open deployments
    let cors_origins_env = std::env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());

    let cors = if cors_origins_env.trim() == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_origins_env
            .split(',')
            .filter_map(|o| o.trim().parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Build Axum router
    let app = build_router(AppState { service, auth }).layer(cors);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listen address");
    axum::serve(listener, app)
        .await
        .expect("server terminated unexpectedly");
}
