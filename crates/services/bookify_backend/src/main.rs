// File: crates/services/bookify_backend/src/main.rs
use axum::{http::StatusCode, response::Json, routing::get, Router};
use bookify_common::logging;
use bookify_config::load_config;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

mod app_state;
use app_state::AppState;

#[tokio::main]
async fn main() {
    // Initialize logging with default level (INFO)
    logging::init().expect("Failed to initialize logging");

    info!("Starting Bookify backend service");

    let config = Arc::new(load_config().expect("Failed to load config"));
    info!("✅ Configuration loaded.");

    let app_state = AppState::new(config.clone())
        .await
        .expect("Failed to build application state");

    let mut api_router = Router::new().route("/", get(|| async { "Welcome to Bookify API!" }));

    info!("🔌 Merging availability routes...");
    api_router = api_router.merge(bookify_availability::routes::routes(
        app_state.availability_state.clone(),
    ));

    info!("🔌 Merging booking routes...");
    api_router = api_router.merge(bookify_booking::routes::routes(
        app_state.booking_state.clone(),
    ));

    // Liveness plus a database probe.
    let db = app_state.db.clone();
    api_router = api_router.route(
        "/health",
        get(move || {
            let db = db.clone();
            async move {
                if db.is_healthy().await {
                    (StatusCode::OK, Json(json!({ "status": "ok" })))
                } else {
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({ "status": "degraded" })),
                    )
                }
            }
        }),
    );

    // --- Create Main App Router ---
    // Nest all API routes under /api
    let app = Router::new().nest("/api", api_router);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await.unwrap();
    info!("Starting server at http://{}", addr);
    info!("API endpoints available at http://{}/api", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
