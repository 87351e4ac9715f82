pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health))
        // Entitlements
        .route("/api/entitlements", get(routes::entitlements::get_entitlements))
        .route(
            "/api/entitlements/features/{key}",
            get(routes::entitlements::get_feature),
        )
        .route(
            "/api/entitlements/check/{action}",
            get(routes::entitlements::check_action),
        )
        .route("/api/usage/{kind}", post(routes::entitlements::record_usage))
        // Billing
        .route("/api/plans", get(routes::paywall::list_plans))
        .route("/api/paywall/{feature}", get(routes::paywall::get_paywall))
        .route(
            "/api/billing/create-checkout",
            post(routes::checkout::create_checkout),
        )
        // Admin dashboards
        .route("/api/admin/members", get(routes::admin::list_members))
        .route("/api/admin/api-keys", get(routes::admin::list_api_keys))
        .route("/api/admin/incidents", get(routes::admin::list_incidents))
        .route("/api/admin/seats", get(routes::admin::get_seats))
        .route("/api/admin/health", get(routes::admin::get_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn load_state(root: PathBuf) -> anyhow::Result<AppState> {
    let state = tokio::task::spawn_blocking(move || AppState::load(root)).await??;
    Ok(state)
}

/// Start the dev API server on `port`.
pub async fn serve(root: PathBuf, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(root, listener).await
}

/// Start the dev API server on a pre-bound listener.
///
/// Unlike `serve`, the caller can read the actual port before starting
/// (useful when `port = 0` and the OS picks a free port).
pub async fn serve_on(root: PathBuf, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(load_state(root).await?);

    tracing::info!("PromptForge dev server listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
