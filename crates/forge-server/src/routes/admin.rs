use axum::{
    extract::{Query, State},
    Json,
};
use forge_core::admin::{filter_api_keys, open_incidents, AdminDataSource};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::state::AppState;

/// Run a read against the admin data source off the async executor.
async fn read_admin<T, F>(admin: Arc<dyn AdminDataSource>, f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&dyn AdminDataSource) -> forge_core::Result<T> + Send + 'static,
{
    let value = tokio::task::spawn_blocking(move || f(admin.as_ref()))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(value)
}

/// GET /api/admin/members
pub async fn list_members(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let members = read_admin(app.admin.clone(), |a| a.members()).await?;
    Ok(Json(serde_json::json!(members)))
}

#[derive(Deserialize)]
pub struct KeySearch {
    pub q: Option<String>,
}

/// GET /api/admin/api-keys?q=
pub async fn list_api_keys(
    State(app): State<AppState>,
    Query(search): Query<KeySearch>,
) -> Result<Json<serde_json::Value>, AppError> {
    let keys = read_admin(app.admin.clone(), |a| a.api_keys()).await?;
    let body = match search.q.as_deref().filter(|t| !t.is_empty()) {
        Some(term) => serde_json::json!(filter_api_keys(&keys, term)),
        None => serde_json::json!(keys),
    };
    Ok(Json(body))
}

/// GET /api/admin/incidents
pub async fn list_incidents(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let incidents = read_admin(app.admin.clone(), |a| a.incidents()).await?;
    Ok(Json(serde_json::json!({
        "open": open_incidents(&incidents),
        "incidents": incidents,
    })))
}

/// GET /api/admin/seats
pub async fn get_seats(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let seats = read_admin(app.admin.clone(), |a| a.seat_overview()).await?;
    Ok(Json(serde_json::json!({
        "seatsAvailable": seats.seats_available(),
        "needsMoreSeats": seats.needs_more_seats(),
        "overview": seats,
    })))
}

/// GET /api/admin/health
pub async fn get_health(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let health = read_admin(app.admin.clone(), |a| a.health()).await?;
    Ok(Json(serde_json::json!(health)))
}
