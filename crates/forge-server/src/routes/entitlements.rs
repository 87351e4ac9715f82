use axum::{
    extract::{Path, Query, State},
    Json,
};
use forge_core::backend::EntitlementsResponse;
use forge_core::cancel::CancelToken;
use forge_core::entitlements::{can_use_feature, Capability};
use forge_core::manager::EntitlementCheck;
use forge_core::paywall::recommended_plan;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairQuery {
    pub org_id: Option<String>,
    pub user_id: Option<String>,
}

impl PairQuery {
    pub(crate) fn require(self) -> Result<(String, String), AppError> {
        let org_id = self
            .org_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::bad_request("orgId is required"))?;
        let user_id = self
            .user_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::bad_request("userId is required"))?;
        Ok((org_id, user_id))
    }
}

// ---------------------------------------------------------------------------
// Resolve
// ---------------------------------------------------------------------------

/// GET /api/entitlements?orgId=&userId=: merged entitlement map for the pair
pub async fn get_entitlements(
    State(app): State<AppState>,
    Query(q): Query<PairQuery>,
) -> Result<Json<EntitlementsResponse>, AppError> {
    let (org_id, user_id) = q.require()?;
    let manager = app.manager.clone();
    let result = tokio::task::spawn_blocking(move || {
        let resolved = manager.fetch(&user_id, &org_id, &CancelToken::new())?;
        Ok::<_, forge_core::ForgeError>(EntitlementsResponse {
            org_id,
            user_id,
            plan: Some(resolved.plan),
            entitlements: resolved.entitlements,
            subscription: resolved.subscription,
            membership: resolved.membership,
        })
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(result))
}

/// GET /api/entitlements/features/:key: single capability check
pub async fn get_feature(
    State(app): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<PairQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (org_id, user_id) = q.require()?;
    let capability =
        Capability::from_key(&key).ok_or(forge_core::ForgeError::UnknownCapability(key.clone()))?;
    let manager = app.manager.clone();
    let result = tokio::task::spawn_blocking(move || {
        let resolved = manager.fetch(&user_id, &org_id, &CancelToken::new())?;
        let allowed = can_use_feature(&resolved.entitlements, &key);
        let recommended = (!allowed).then(|| recommended_plan(capability));
        Ok::<_, forge_core::ForgeError>(serde_json::json!({
            "feature": key,
            "allowed": allowed,
            "value": resolved.entitlements.get(capability),
            "currentPlan": resolved.plan,
            "recommendedPlan": recommended,
        }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(result))
}

// ---------------------------------------------------------------------------
// Quota checks
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub org_id: Option<String>,
    pub user_id: Option<String>,
    pub format: Option<String>,
}

/// GET /api/entitlements/check/:action: `generate`, `gpt-optimization` or
/// `export` (with `?format=`)
pub async fn check_action(
    State(app): State<AppState>,
    Path(action): Path<String>,
    Query(q): Query<CheckQuery>,
) -> Result<Json<EntitlementCheck>, AppError> {
    let format = q.format;
    let (org_id, user_id) = PairQuery {
        org_id: q.org_id,
        user_id: q.user_id,
    }
    .require()?;
    let manager = app.manager.clone();
    let check = match action.as_str() {
        "generate" => {
            tokio::task::spawn_blocking(move || manager.can_generate_prompt(&user_id, &org_id))
                .await
        }
        "gpt-optimization" => {
            tokio::task::spawn_blocking(move || manager.can_use_gpt_optimization(&user_id, &org_id))
                .await
        }
        "export" => {
            let format = format.ok_or_else(|| AppError::bad_request("format is required"))?;
            tokio::task::spawn_blocking(move || {
                manager.can_export_format(&user_id, &org_id, &format)
            })
            .await
        }
        other => return Err(AppError::bad_request(format!("unknown check: {other}"))),
    }
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;
    Ok(Json(check))
}

// ---------------------------------------------------------------------------
// Usage tracking
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageBody {
    pub org_id: String,
    pub user_id: String,
}

/// POST /api/usage/:kind: record a prompt run (`runs`) or GPT optimization
/// (`gpt-optimizations`)
pub async fn record_usage(
    State(app): State<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<UsageBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let manager = app.manager.clone();
    let UsageBody { org_id, user_id } = body;
    match kind.as_str() {
        "runs" => {
            tokio::task::spawn_blocking(move || manager.track_prompt_generation(&user_id, &org_id))
                .await
        }
        "gpt-optimizations" => {
            tokio::task::spawn_blocking(move || manager.track_gpt_optimization(&user_id, &org_id))
                .await
        }
        other => return Err(AppError::not_found(format!("unknown usage kind: {other}"))),
    }
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;
    Ok(Json(serde_json::json!({ "recorded": kind })))
}
